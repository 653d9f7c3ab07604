//! Systolic NPU Simulator
//!
//! A cycle-accurate model of a weight-stationary systolic array: an N×N grid
//! of multiply-accumulate elements, a diagonal weight loader and two
//! gatekeeper chains that skew input vectors in and results out.
//!
//! # Overview
//!
//! Every cycle is a two-phase beat. Phase 1 evaluates all elements against
//! the state committed by the previous beat; Phase 2 commits the whole grid at
//! once. The outcome therefore never depends on the order elements are
//! visited, which the simulator exercises with row-major, column-major,
//! reverse and rayon-parallel evaluation.
//!
//! A run has two phases:
//!
//! - **Load** (`cycle < N`): weights enter at the top edge and move one row
//!   down per beat until `weights[r][c]` sits in element `(r, c)`.
//! - **Compute**: the input chain feeds one vector element per active row
//!   into column 0 with a one-cycle skew per row, partial sums flow down,
//!   and the output chain captures the bottom row with a one-cycle skew per
//!   column.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use systolic_npu_sim::prelude::*;
//!
//! // 8×8 array, first dense layer of the reference network, four vectors
//! let config = NpuConfig::dense_demo();
//!
//! let mut sim = Simulator::new(config.clone())?;
//! let report = sim.run_to_completion()?;
//! println!("{}", report);
//!
//! let check = Verification::new(&config, &report.results);
//! assert!(check.passed());
//! # Ok::<(), NpuError>(())
//! ```
//!
//! # Stepping by hand
//!
//! ```rust,no_run
//! use systolic_npu_sim::prelude::*;
//!
//! let mut sim = Simulator::new(NpuConfig::tiny())?;
//! sim.load_weights()?;
//! while !sim.is_complete() {
//!     let cycle = sim.apply(&Command::Step)?;
//!     println!("{:?}", cycle);
//! }
//! println!("{}", sim.render_trace());
//! # Ok::<(), NpuError>(())
//! ```

pub mod error;
pub mod config;
pub mod schedule;
pub mod pe;
pub mod grid;
pub mod gatekeeper;
pub mod loader;
pub mod trace;
pub mod control;
pub mod simulation;
pub mod workloads;
pub mod comparison;

/// Native register word. Overflow is judged against the configured
/// accumulator width, not against this type.
pub type Word = i32;

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::config::{NpuConfig, EvalOrder, TraceConfig};
    pub use crate::error::{NpuError, Result};
    pub use crate::schedule::{Clock, Thresholds};
    pub use crate::pe::{ProcessingElement, Mac};
    pub use crate::grid::{Grid, BeatOutcome, Overflow};
    pub use crate::gatekeeper::{Gatekeeper, GatekeeperChain};
    pub use crate::loader::WeightLoader;
    pub use crate::trace::TraceEmitter;
    pub use crate::control::Command;
    pub use crate::simulation::{Simulator, SimulationReport, SimulationStats, CycleReport, Phase};
    pub use crate::workloads::{WorkloadConfig, OutputCollector};
    pub use crate::comparison::{Verification, Mismatch, expected_outputs};
    pub use crate::Word;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cycles a full run takes for an N×N grid, L active rows and K vectors
pub fn cycles_for(grid_size: usize, input_len: usize, num_vectors: usize) -> u64 {
    schedule::Thresholds::new(grid_size, input_len, num_vectors).completion_cycle()
}
