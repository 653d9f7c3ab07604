//! Workload helpers
//!
//! - Synthetic matrix workloads for arbitrary grid shapes
//! - Output collection: de-skewing what the output gatekeepers emit back
//!   into one result row per input vector

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::NpuConfig;
use crate::schedule::Thresholds;
use crate::Word;

/// Parameters of a synthetic workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub grid_size: usize,
    /// Active input rows; the rest of the input matrix stays zero
    pub input_len: usize,
    pub num_vectors: usize,
    /// Values are drawn from `-magnitude..=magnitude`
    pub magnitude: Word,
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            grid_size: 8,
            input_len: 8,
            num_vectors: 4,
            magnitude: 127,
            seed: 0x5EED,
        }
    }
}

impl WorkloadConfig {
    /// Signed-byte weights and inputs of the requested shape
    pub fn generate(&self) -> NpuConfig {
        let n = self.grid_size;
        let band = n.saturating_sub(self.input_len);
        // i32::MIN has no positive counterpart
        let m = self.magnitude.saturating_abs();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let weights: Vec<Vec<Word>> = (0..n)
            .map(|_| (0..n).map(|_| rng.gen_range(-m..=m)).collect())
            .collect();
        let inputs: Vec<Vec<Word>> = (0..n)
            .map(|r| {
                (0..self.num_vectors)
                    .map(|_| if r < band { 0 } else { rng.gen_range(-m..=m) })
                    .collect()
            })
            .collect();

        let mut config = NpuConfig::from_matrices(weights, inputs);
        config.num_vectors = self.num_vectors;
        config.input_len = Some(self.input_len);
        config
    }
}

/// Gathers output-gatekeeper emissions into a K×N result matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputCollector {
    thresholds: Thresholds,
    results: Vec<Vec<Word>>,
    recorded: usize,
    /// Nonzero values emitted outside their expected cycle
    stray: u64,
}

impl OutputCollector {
    pub fn new(thresholds: Thresholds) -> Self {
        OutputCollector {
            thresholds,
            results: vec![vec![0; thresholds.grid_size]; thresholds.num_vectors],
            recorded: 0,
            stray: 0,
        }
    }

    /// Record the outputs emitted during `cycle`
    pub fn record(&mut self, cycle: u64, outputs: &[Word]) {
        let start = self.thresholds.output_start();
        for (col, &value) in outputs.iter().enumerate() {
            let vector = cycle
                .checked_sub(start + col as u64)
                .map(|v| v as usize)
                .filter(|&v| v < self.thresholds.num_vectors);
            match vector {
                Some(v) => {
                    self.results[v][col] = value;
                    self.recorded += 1;
                }
                None if value != 0 => self.stray += 1,
                None => {}
            }
        }
    }

    /// Every (vector, column) slot has been seen
    pub fn is_complete(&self) -> bool {
        self.recorded >= self.thresholds.num_vectors * self.thresholds.grid_size
    }

    pub fn results(&self) -> &[Vec<Word>] {
        &self.results
    }

    pub fn stray(&self) -> u64 {
        self.stray
    }
}
