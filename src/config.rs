//! NPU Configuration Module
//!
//! Defines the design-time parameters of the systolic array and the matrices
//! it is driven with. A configuration is immutable for the duration of a run
//! and is validated once, before any simulator state is built.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NpuError, Result};
use crate::schedule::Thresholds;
use crate::Word;

/// Complete simulator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpuConfig {
    /// Side length N of the square processing-element grid
    pub grid_size: usize,
    /// Number of active input rows L (vectors occupy the bottom L grid rows).
    /// Defaults to the full grid height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_len: Option<usize>,
    /// Number of input vectors K streamed through the array
    pub num_vectors: usize,
    /// Signed register width used to flag accumulator overflow
    #[serde(default = "default_accumulator_bits")]
    pub accumulator_bits: u32,
    /// Order in which Phase 1 visits the elements of the grid
    #[serde(default)]
    pub eval_order: EvalOrder,
    /// N×N weight matrix; row r ends up in grid row r after loading
    pub weights: Vec<Vec<Word>>,
    /// N×K input matrix, one column per vector
    pub inputs: Vec<Vec<Word>>,
    /// Trace emitter settings
    #[serde(default)]
    pub trace: TraceConfig,
}

/// Phase-1 evaluation order. Every order must produce identical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvalOrder {
    #[default]
    RowMajor,
    ColumnMajor,
    /// Last element first
    Reverse,
    /// Phase 1 fanned out over the rayon thread pool
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Emit a trace after every step
    #[serde(default)]
    pub enabled: bool,
    /// Destination file, rewritten on every emission
    #[serde(default = "default_trace_path")]
    pub path: PathBuf,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            enabled: false,
            path: default_trace_path(),
        }
    }
}

fn default_accumulator_bits() -> u32 {
    16
}

fn default_trace_path() -> PathBuf {
    PathBuf::from("mac_matrix_info.txt")
}

/// First dense layer of the reference network, one row per input feature
const DENSE1_WEIGHTS: [[Word; 8]; 4] = [
    [85, 37, -3, -115, -110, -98, 95, -14],
    [98, 10, 13, -15, -43, 69, 68, 37],
    [-35, -128, -26, 53, -20, -5, 127, -81],
    [-58, -47, 43, -57, -53, 94, 34, 109],
];

/// Reference input vectors (one per row here, one per column in `inputs`)
const DENSE1_VECTORS: [[Word; 4]; 4] = [
    [77, -36, 54, -72],
    [96, -26, 29, -93],
    [95, -37, 33, -78],
    [110, 32, -59, -122],
];

impl Default for NpuConfig {
    fn default() -> Self {
        NpuConfig::dense_demo()
    }
}

impl NpuConfig {
    /// 8×8 array running the first dense layer on four vectors.
    /// The 4-wide input occupies grid rows 4..8.
    pub fn dense_demo() -> Self {
        let n = 8;
        let k = DENSE1_VECTORS.len();
        let band = n - DENSE1_WEIGHTS.len();

        let mut weights = vec![vec![0; n]; n];
        for (i, row) in DENSE1_WEIGHTS.iter().enumerate() {
            weights[band + i] = row.to_vec();
        }

        let mut inputs = vec![vec![0; k]; n];
        for (v, vector) in DENSE1_VECTORS.iter().enumerate() {
            for (i, &x) in vector.iter().enumerate() {
                inputs[band + i][v] = x;
            }
        }

        NpuConfig {
            grid_size: n,
            input_len: Some(DENSE1_WEIGHTS.len()),
            num_vectors: k,
            accumulator_bits: default_accumulator_bits(),
            eval_order: EvalOrder::RowMajor,
            weights,
            inputs,
            trace: TraceConfig::default(),
        }
    }

    /// Full-height 8×8 array with the dense weights stacked twice and three
    /// vectors. Some accumulations exceed 16 bits.
    pub fn full_width() -> Self {
        let n = 8;
        let vectors = [DENSE1_VECTORS[0], DENSE1_VECTORS[1], DENSE1_VECTORS[1]];
        let k = vectors.len();

        let weights: Vec<Vec<Word>> = (0..n)
            .map(|r| DENSE1_WEIGHTS[r % DENSE1_WEIGHTS.len()].to_vec())
            .collect();
        let inputs: Vec<Vec<Word>> = (0..n)
            .map(|r| vectors.iter().map(|v| v[r % v.len()]).collect())
            .collect();

        NpuConfig {
            grid_size: n,
            input_len: None,
            num_vectors: k,
            accumulator_bits: default_accumulator_bits(),
            eval_order: EvalOrder::RowMajor,
            weights,
            inputs,
            trace: TraceConfig::default(),
        }
    }

    /// 2×2 identity array with two vectors, handy for smoke tests
    pub fn tiny() -> Self {
        NpuConfig {
            grid_size: 2,
            input_len: None,
            num_vectors: 2,
            accumulator_bits: default_accumulator_bits(),
            eval_order: EvalOrder::RowMajor,
            weights: vec![vec![1, 0], vec![0, 1]],
            inputs: vec![vec![3, 5], vec![4, 6]],
            trace: TraceConfig::default(),
        }
    }

    /// Build a configuration from matrices, deriving K from the input columns
    pub fn from_matrices(weights: Vec<Vec<Word>>, inputs: Vec<Vec<Word>>) -> Self {
        let num_vectors = inputs.first().map_or(0, |row| row.len());
        NpuConfig {
            grid_size: weights.len(),
            input_len: None,
            num_vectors,
            accumulator_bits: default_accumulator_bits(),
            eval_order: EvalOrder::RowMajor,
            weights,
            inputs,
            trace: TraceConfig::default(),
        }
    }

    /// Number of active input rows L
    pub fn input_len(&self) -> usize {
        self.input_len.unwrap_or(self.grid_size)
    }

    /// First grid row of the active input band
    pub fn band_start(&self) -> usize {
        self.grid_size.saturating_sub(self.input_len())
    }

    pub fn num_elements(&self) -> usize {
        self.grid_size * self.grid_size
    }

    /// Closed-form schedule for this configuration
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.grid_size, self.input_len(), self.num_vectors)
    }

    /// Reject configurations that would silently misalign the pipeline
    pub fn validate(&self) -> Result<()> {
        let n = self.grid_size;
        if n == 0 {
            return Err(NpuError::config("grid_size must be at least 1"));
        }
        if self.num_vectors == 0 {
            return Err(NpuError::config("num_vectors must be at least 1"));
        }
        if !(2..=32).contains(&self.accumulator_bits) {
            return Err(NpuError::config(format!(
                "accumulator_bits must be within 2..=32, got {}",
                self.accumulator_bits
            )));
        }

        let l = self.input_len();
        if l == 0 || l > n {
            return Err(NpuError::config(format!(
                "input_len must be within 1..={}, got {}",
                n, l
            )));
        }

        if self.weights.len() != n {
            return Err(NpuError::config(format!(
                "weight matrix has {} rows, expected {}",
                self.weights.len(),
                n
            )));
        }
        if let Some((r, row)) = self.weights.iter().enumerate().find(|(_, row)| row.len() != n) {
            return Err(NpuError::config(format!(
                "weight row {} has {} columns, expected {}",
                r,
                row.len(),
                n
            )));
        }

        if self.inputs.len() != n {
            return Err(NpuError::config(format!(
                "input matrix has {} rows, expected {}",
                self.inputs.len(),
                n
            )));
        }
        if let Some((r, row)) = self
            .inputs
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.num_vectors)
        {
            return Err(NpuError::config(format!(
                "input row {} has {} columns but num_vectors is {}",
                r,
                row.len(),
                self.num_vectors
            )));
        }

        // The input chain only feeds the active band.
        let band = self.band_start();
        if let Some(r) = (0..band).find(|&r| self.inputs[r].iter().any(|&x| x != 0)) {
            return Err(NpuError::config(format!(
                "input row {} is outside the active band {}..{} but holds nonzero data",
                r, band, n
            )));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Load and validate configuration from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let toml_str = std::fs::read_to_string(path)?;
        let config: NpuConfig = toml::from_str(&toml_str)?;
        config.validate()?;
        Ok(config)
    }
}
