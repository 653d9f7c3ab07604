//! Weight loader: the diagonal weight-injection sequence.
//!
//! Weights enter at the top edge and move one row down per beat while the
//! global enable is asserted. To end with `weights[r]` in grid row `r`, the
//! loader feeds the matrix bottom row first: on load cycle `i` it stages
//! `weights[N-1-i]`, which then travels `N-1-i` rows during the remaining
//! load beats.

use log::{debug, info};

use crate::grid::{BeatOutcome, Grid};
use crate::Word;

#[derive(Debug, Clone)]
pub struct WeightLoader {
    weights: Vec<Vec<Word>>,
    cycle: usize,
}

impl WeightLoader {
    pub fn new(weights: Vec<Vec<Word>>) -> Self {
        WeightLoader { weights, cycle: 0 }
    }

    /// Load cycles needed for the full matrix
    pub fn total_cycles(&self) -> usize {
        self.weights.len()
    }

    /// Load cycles already performed
    pub fn cycles_done(&self) -> usize {
        self.cycle
    }

    pub fn is_complete(&self) -> bool {
        self.cycle >= self.weights.len()
    }

    /// Matrix row staged on load cycle `cycle`
    pub fn row_for_cycle(&self, cycle: usize) -> usize {
        self.weights.len() - 1 - cycle
    }

    /// Load cycle on which matrix row `row` is injected
    pub fn injection_cycle(&self, row: usize) -> usize {
        self.weights.len() - 1 - row
    }

    /// Stage the next weight row and beat the grid with the enable asserted.
    /// Returns `None` once every row has been injected.
    pub fn load_cycle(&mut self, grid: &mut Grid) -> Option<BeatOutcome> {
        if self.is_complete() {
            return None;
        }
        let row = self.row_for_cycle(self.cycle);
        debug!("load cycle {}: injecting weight row {}", self.cycle, row);
        grid.stage_weight_row(&self.weights[row]);
        let outcome = grid.beat(true);
        self.cycle += 1;
        if self.is_complete() {
            info!("weights loaded after {} cycles", self.cycle);
        }
        Some(outcome)
    }

    /// Run every remaining load cycle
    pub fn load_all(&mut self, grid: &mut Grid) {
        while self.load_cycle(grid).is_some() {}
    }
}
