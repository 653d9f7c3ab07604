//! Multiply-accumulate processing element

use serde::{Deserialize, Serialize};

use crate::Word;

/// State of a single MAC unit in the grid.
///
/// Neighbours are never stored here: the grid derives them from `(row, col)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingElement {
    pub row: usize,
    pub col: usize,
    /// Committed weight
    pub weight: Word,
    /// Weight staged from above (or by the loader in row 0); committed only
    /// while the global enable is asserted
    pub pending_weight: Word,
    /// Operand used in the most recent beat (column 0: pushed externally)
    pub current_input: Word,
    /// Operand handed to the right neighbour on the next beat
    pub previous_input: Word,
    /// Committed partial sum from above
    pub sum: Word,
    pub pending_sum: Word,
    /// MAC output of the most recent beat
    pub result: Word,
}

impl ProcessingElement {
    pub fn new(row: usize, col: usize) -> Self {
        ProcessingElement {
            row,
            col,
            ..Default::default()
        }
    }

    /// Scalar id, `row * N + col`
    pub fn id(&self, grid_size: usize) -> usize {
        self.row * grid_size + self.col
    }
}

/// Outcome of one multiply-accumulate at register width `bits`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mac {
    /// Native-width result (wraps at `i32`)
    pub value: Word,
    /// Result before truncation to the native width
    pub exact: i64,
    /// Exact result did not fit in the configured signed width
    pub overflow: bool,
}

/// `weight * input + sum`, flagging results outside a `bits`-wide signed range
pub fn mac(weight: Word, input: Word, sum: Word, bits: u32) -> Mac {
    let exact = weight as i64 * input as i64 + sum as i64;
    let max = (1i64 << (bits - 1)) - 1;
    let min = -(1i64 << (bits - 1));
    Mac {
        value: weight.wrapping_mul(input).wrapping_add(sum),
        exact,
        overflow: exact < min || exact > max,
    }
}
