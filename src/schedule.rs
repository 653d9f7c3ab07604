//! Pipeline schedule: closed-form activation thresholds and the cycle clock.
//!
//! With an N×N grid, L active input rows and K vectors:
//!
//! - the weight loader occupies cycles `0..N`, so the input chain head fires
//!   at cycle `N`;
//! - input gatekeeper `m` (grid row `N-L+m`) emits vector `v` at `N + m + v`;
//! - a partial sum entering grid row `N-L` reaches the bottom row `L-1` beats
//!   later, and output column `j` lags column 0 by `j`, so vector `v` leaves
//!   column `j` at `N - 1 + L + j + v`.
//!
//! The counters in [`Clock`] are incremented by the scheduler but must always
//! agree with [`Thresholds::input_cycles_at`] and
//! [`Thresholds::result_cycles_at`].

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Activation thresholds derived from grid size, input length and vector count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub grid_size: usize,
    pub input_len: usize,
    pub num_vectors: usize,
}

impl Thresholds {
    pub fn new(grid_size: usize, input_len: usize, num_vectors: usize) -> Self {
        Thresholds {
            grid_size,
            input_len,
            num_vectors,
        }
    }

    fn n(&self) -> u64 {
        self.grid_size as u64
    }

    fn l(&self) -> u64 {
        self.input_len as u64
    }

    fn k(&self) -> u64 {
        self.num_vectors as u64
    }

    /// Cycles spent in the weight-load phase
    pub fn load_cycles(&self) -> u64 {
        self.n()
    }

    /// Cycle at which the input chain head is triggered
    pub fn input_start(&self) -> u64 {
        self.n()
    }

    /// Cycle at which the output chain head is triggered.
    /// Saturates at 0 for an empty grid.
    pub fn output_start(&self) -> u64 {
        (self.n() + self.l()).saturating_sub(1)
    }

    /// Cycles during which input gatekeepers may emit
    pub fn input_window(&self) -> Range<u64> {
        self.input_start()..self.input_start() + (self.l() + self.k()).saturating_sub(1)
    }

    /// Cycles during which output gatekeepers may emit
    pub fn result_window(&self) -> Range<u64> {
        self.output_start()..self.output_start() + (self.n() + self.k()).saturating_sub(1)
    }

    /// First cycle count at which every output has been emitted
    pub fn completion_cycle(&self) -> u64 {
        self.result_window().end
    }

    /// Cycle at which `vector` leaves output column `col`
    pub fn emission_cycle(&self, vector: usize, col: usize) -> u64 {
        self.output_start() + col as u64 + vector as u64
    }

    /// Cycle at which `vector` enters grid column 0 at input chain position `position`
    pub fn injection_cycle(&self, vector: usize, position: usize) -> u64 {
        self.input_start() + position as u64 + vector as u64
    }

    /// Value of the input-cycle counter once `cycle` cycles have completed
    pub fn input_cycles_at(&self, cycle: u64) -> u64 {
        clamp_into(cycle, self.input_window())
    }

    /// Value of the result-cycle counter once `cycle` cycles have completed
    pub fn result_cycles_at(&self, cycle: u64) -> u64 {
        clamp_into(cycle, self.result_window())
    }
}

fn clamp_into(cycle: u64, window: Range<u64>) -> u64 {
    cycle.clamp(window.start, window.end) - window.start
}

/// Global simulation clock and phase counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    /// Completed cycles, load phase included
    pub cycle: u64,
    /// Completed cycles inside the input window
    pub input_cycles: u64,
    /// Completed cycles inside the result window
    pub result_cycles: u64,
}

impl Clock {
    pub fn reset(&mut self) {
        *self = Clock::default();
    }

    /// Close the current cycle, bumping the phase counters whose window
    /// contains it.
    pub fn advance(&mut self, thresholds: &Thresholds) {
        if thresholds.input_window().contains(&self.cycle) {
            self.input_cycles += 1;
        }
        if thresholds.result_window().contains(&self.cycle) {
            self.result_cycles += 1;
        }
        self.cycle += 1;
    }
}
