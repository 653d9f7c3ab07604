//! Result Verification Module
//!
//! Checks what the array emitted against the plain matrix product
//! `Σ_i W[i][j] · x_k[i]` computed directly from the configuration.

use serde::{Deserialize, Serialize};

use crate::config::NpuConfig;
use crate::Word;

/// Reference product, one row per input vector. Arithmetic wraps like the
/// array's native registers.
pub fn expected_outputs(config: &NpuConfig) -> Vec<Vec<Word>> {
    let n = config.grid_size;
    (0..config.num_vectors)
        .map(|v| {
            (0..n)
                .map(|j| {
                    config
                        .weights
                        .iter()
                        .zip(&config.inputs)
                        .fold(0 as Word, |acc, (w_row, x_row)| {
                            acc.wrapping_add(w_row[j].wrapping_mul(x_row[v]))
                        })
                })
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub vector: usize,
    pub col: usize,
    pub expected: Word,
    pub actual: Word,
}

/// Collected results compared element-wise against the reference product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub expected: Vec<Vec<Word>>,
    pub actual: Vec<Vec<Word>>,
    pub mismatches: Vec<Mismatch>,
}

impl Verification {
    pub fn new(config: &NpuConfig, actual: &[Vec<Word>]) -> Self {
        let expected = expected_outputs(config);
        let mut mismatches = Vec::new();

        for (vector, exp_row) in expected.iter().enumerate() {
            let act_row = actual.get(vector);
            for (col, &exp) in exp_row.iter().enumerate() {
                // a missing row or column counts as zero
                let act = act_row.and_then(|r| r.get(col)).copied().unwrap_or(0);
                if act != exp {
                    mismatches.push(Mismatch {
                        vector,
                        col,
                        expected: exp,
                        actual: act,
                    });
                }
            }
        }

        Verification {
            expected,
            actual: actual.to_vec(),
            mismatches,
        }
    }

    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn checked(&self) -> usize {
        self.expected.iter().map(Vec::len).sum()
    }
}

impl std::fmt::Display for Verification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.passed() {
            return writeln!(f, "verification passed: {} outputs match", self.checked());
        }
        writeln!(
            f,
            "verification failed: {} of {} outputs differ",
            self.mismatches.len(),
            self.checked()
        )?;
        for m in &self.mismatches {
            writeln!(
                f,
                "  vector {} column {}: expected {}, got {}",
                m.vector, m.col, m.expected, m.actual
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_dense_demo_first_vector() {
        let expected = expected_outputs(&NpuConfig::dense_demo());
        assert_eq!(expected.len(), 4);
        assert_eq!(expected[0], vec![5303, -1039, -5199, -1349, -4186, -17068, 9277, -14632]);
    }

    #[test]
    fn test_expected_identity() {
        let expected = expected_outputs(&NpuConfig::tiny());
        assert_eq!(expected, vec![vec![3, 4], vec![5, 6]]);
    }

    #[test]
    fn test_verification_passes_on_match() {
        let config = NpuConfig::tiny();
        let v = Verification::new(&config, &[vec![3, 4], vec![5, 6]]);
        assert!(v.passed());
        assert_eq!(v.checked(), 4);
        assert!(v.to_string().contains("passed"));
    }

    #[test]
    fn test_verification_lists_mismatches() {
        let config = NpuConfig::tiny();
        let v = Verification::new(&config, &[vec![3, 9]]);
        assert!(!v.passed());
        assert_eq!(
            v.mismatches,
            vec![
                Mismatch { vector: 0, col: 1, expected: 4, actual: 9 },
                Mismatch { vector: 1, col: 0, expected: 5, actual: 0 },
                Mismatch { vector: 1, col: 1, expected: 6, actual: 0 },
            ]
        );
        assert!(v.to_string().contains("3 of 4"));
    }
}
