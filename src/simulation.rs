//! Cycle-Accurate Simulation Engine
//!
//! Owns every piece of simulator state and advances it one cycle per step:
//! - Load phase (`cycle < N`): one weight-loader beat per step
//! - Compute phase: gatekeeper chains, grid beat, output capture
//! - Trace emission and statistics after every step

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::NpuConfig;
use crate::control::Command;
use crate::error::{NpuError, Result};
use crate::gatekeeper::GatekeeperChain;
use crate::grid::{Grid, Overflow};
use crate::loader::WeightLoader;
use crate::schedule::{Clock, Thresholds};
use crate::trace::{self, TraceEmitter};
use crate::workloads::OutputCollector;
use crate::Word;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Weights travelling into place, enable asserted
    Load,
    /// Vectors streaming through the stationary weights
    Compute,
}

/// Everything observable about one executed cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Index of the cycle just executed
    pub cycle: u64,
    pub phase: Phase,
    /// Values the input gatekeepers pushed into column 0 (empty while loading)
    pub input_outputs: Vec<Word>,
    /// Values the output gatekeepers emitted (empty while loading)
    pub outputs: Vec<Word>,
    pub overflows: Vec<Overflow>,
}

/// Simulation statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    pub load_cycles: u64,
    pub compute_cycles: u64,
    pub mac_operations: u64,
    pub overflow_warnings: u64,
    pub nonzero_outputs: u64,
    /// `(cycle, element)` for every overflow warning issued
    pub overflow_log: Vec<(u64, Overflow)>,
}

/// The main simulation engine
pub struct Simulator {
    config: NpuConfig,
    thresholds: Thresholds,
    clock: Clock,
    grid: Grid,
    loader: WeightLoader,
    input_chain: GatekeeperChain,
    output_chain: GatekeeperChain,
    collector: OutputCollector,
    trace: Option<TraceEmitter>,
    stats: SimulationStats,
    /// Enable level of the last beat, shown in the trace
    last_enable: bool,
    stopped: bool,
}

impl Simulator {
    /// Validate `config` and build a simulator at cycle 0 with every register
    /// cleared.
    pub fn new(config: NpuConfig) -> Result<Self> {
        config.validate()?;

        let n = config.grid_size;
        let thresholds = config.thresholds();
        let trace = config
            .trace
            .enabled
            .then(|| TraceEmitter::new(config.trace.path.clone()));

        info!(
            "simulator ready: {}x{} grid, {} active rows, {} vectors, {}-bit accumulators",
            n,
            n,
            thresholds.input_len,
            thresholds.num_vectors,
            config.accumulator_bits
        );

        Ok(Simulator {
            grid: Grid::new(n, config.accumulator_bits, config.eval_order),
            loader: WeightLoader::new(config.weights.clone()),
            input_chain: GatekeeperChain::new("input", thresholds.input_len, thresholds.num_vectors),
            output_chain: GatekeeperChain::new("output", n, thresholds.num_vectors),
            collector: OutputCollector::new(thresholds),
            stats: SimulationStats::default(),
            last_enable: false,
            stopped: false,
            thresholds,
            clock: Clock::default(),
            trace,
            config,
        })
    }

    pub fn config(&self) -> &NpuConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn input_chain(&self) -> &GatekeeperChain {
        &self.input_chain
    }

    pub fn output_chain(&self) -> &GatekeeperChain {
        &self.output_chain
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn trace_emitter(&self) -> Option<&TraceEmitter> {
        self.trace.as_ref()
    }

    /// Route trace emissions to `emitter`, or switch them off with `None`
    pub fn set_trace(&mut self, emitter: Option<TraceEmitter>) {
        self.trace = emitter;
    }

    pub fn phase(&self) -> Phase {
        if self.loader.is_complete() {
            Phase::Compute
        } else {
            Phase::Load
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Every output has left the array
    pub fn is_complete(&self) -> bool {
        self.clock.cycle >= self.thresholds.completion_cycle()
    }

    /// De-skewed results, one row per input vector
    pub fn results(&self) -> &[Vec<Word>] {
        self.collector.results()
    }

    /// Render the current trace without writing it anywhere
    pub fn render_trace(&self) -> String {
        trace::render(&self.grid, self.last_enable, &self.clock)
    }

    /// Advance exactly one cycle
    pub fn step(&mut self) -> Result<CycleReport> {
        if self.stopped {
            return Err(NpuError::SimulationStopped { cycle: self.clock.cycle });
        }

        let report = match self.phase() {
            Phase::Load => self.load_step(),
            Phase::Compute => self.compute_step(),
        };

        if let Some(emitter) = self.trace.as_mut() {
            emitter.emit(&self.grid, self.last_enable, &self.clock);
        }
        Ok(report)
    }

    fn load_step(&mut self) -> CycleReport {
        let cycle = self.clock.cycle;
        let outcome = self.loader.load_cycle(&mut self.grid).unwrap_or_default();
        self.last_enable = true;
        self.clock.advance(&self.thresholds);
        self.stats.load_cycles += 1;
        self.record_overflows(cycle, &outcome.overflows);

        CycleReport {
            cycle,
            phase: Phase::Load,
            input_outputs: Vec::new(),
            outputs: Vec::new(),
            overflows: outcome.overflows,
        }
    }

    fn compute_step(&mut self) -> CycleReport {
        let cycle = self.clock.cycle;
        let n = self.config.grid_size;
        let k = self.thresholds.num_vectors;
        let band = self.config.band_start();

        let input_trigger = cycle == self.thresholds.input_start();
        let output_trigger = cycle == self.thresholds.output_start();
        if input_trigger {
            info!("input chain triggered at cycle {}", cycle);
        }
        if output_trigger {
            info!("output chain triggered at cycle {}", cycle);
        }
        self.input_chain.drive_head(input_trigger);
        self.output_chain.drive_head(output_trigger);

        // gatekeeper m offers vector (input_cycles - m) of its grid row
        let input_cycles = self.clock.input_cycles as usize;
        for m in 0..self.input_chain.len() {
            let vector = input_cycles.checked_sub(m).filter(|&v| v < k);
            if let Some(v) = vector {
                self.input_chain.stage_input(m, self.config.inputs[band + m][v]);
            }
        }
        let input_outputs = self.input_chain.cycle();

        let mut left_edge = vec![0; n];
        left_edge[band..].copy_from_slice(&input_outputs);
        self.grid.push_left_edge(&left_edge);

        let outcome = self.grid.beat(false);
        self.last_enable = false;

        self.output_chain.stage_inputs(&outcome.bottom);
        let outputs = self.output_chain.cycle();
        self.collector.record(cycle, &outputs);

        self.clock.advance(&self.thresholds);
        self.stats.compute_cycles += 1;
        self.stats.mac_operations += (n * n) as u64;
        self.stats.nonzero_outputs += outputs.iter().filter(|&&x| x != 0).count() as u64;
        self.record_overflows(cycle, &outcome.overflows);

        debug!(
            "cycle {}: in {:?} out {:?} (input cycles {}, result cycles {})",
            cycle, input_outputs, outputs, self.clock.input_cycles, self.clock.result_cycles
        );
        if self.clock.cycle == self.thresholds.completion_cycle() {
            info!("all {} result vectors emitted at cycle {}", k, self.clock.cycle);
        }

        CycleReport {
            cycle,
            phase: Phase::Compute,
            input_outputs,
            outputs,
            overflows: outcome.overflows,
        }
    }

    fn record_overflows(&mut self, cycle: u64, overflows: &[Overflow]) {
        self.stats.overflow_warnings += overflows.len() as u64;
        self.stats
            .overflow_log
            .extend(overflows.iter().map(|&o| (cycle, o)));
    }

    /// Step through whatever is left of the load phase
    pub fn load_weights(&mut self) -> Result<()> {
        while self.phase() == Phase::Load {
            self.step()?;
        }
        Ok(())
    }

    /// Run `cycles` steps, collecting a report for each
    pub fn run(&mut self, cycles: u64) -> Result<Vec<CycleReport>> {
        (0..cycles).map(|_| self.step()).collect()
    }

    /// Step until every output has been emitted
    pub fn run_to_completion(&mut self) -> Result<SimulationReport> {
        while !self.is_complete() {
            self.step()?;
        }
        Ok(self.report())
    }

    /// Apply an external control trigger. Returns the cycle report when the
    /// trigger advanced the clock.
    pub fn apply(&mut self, command: &Command) -> Result<Option<CycleReport>> {
        match command {
            Command::Step => self.step().map(Some),
            Command::Stop => {
                self.stop();
                Ok(None)
            }
            Command::Unknown(raw) => {
                debug!("ignoring unrecognised trigger {:?}", raw);
                Ok(None)
            }
        }
    }

    pub fn stop(&mut self) {
        if !self.stopped {
            info!("simulation stopped at cycle {}", self.clock.cycle);
        }
        self.stopped = true;
    }

    /// Get simulation report
    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            grid_size: self.config.grid_size,
            input_len: self.thresholds.input_len,
            num_vectors: self.thresholds.num_vectors,
            total_cycles: self.clock.cycle,
            input_cycles: self.clock.input_cycles,
            result_cycles: self.clock.result_cycles,
            load_cycles: self.stats.load_cycles,
            compute_cycles: self.stats.compute_cycles,
            mac_operations: self.stats.mac_operations,
            overflow_warnings: self.stats.overflow_warnings,
            nonzero_outputs: self.stats.nonzero_outputs,
            trace_emissions: self.trace.as_ref().map_or(0, |t| t.emissions()),
            stray_outputs: self.collector.stray(),
            complete: self.is_complete() && self.collector.is_complete(),
            results: self.collector.results().to_vec(),
        }
    }
}

/// Summary report from simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub grid_size: usize,
    pub input_len: usize,
    pub num_vectors: usize,
    pub total_cycles: u64,
    pub input_cycles: u64,
    pub result_cycles: u64,
    pub load_cycles: u64,
    pub compute_cycles: u64,
    pub mac_operations: u64,
    pub overflow_warnings: u64,
    pub nonzero_outputs: u64,
    pub trace_emissions: u64,
    /// Nonzero outputs seen outside their emission cycle; nonzero means the
    /// pipeline skew is off
    pub stray_outputs: u64,
    pub complete: bool,
    pub results: Vec<Vec<Word>>,
}

impl std::fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shape = format!("{}x{} / L={} / K={}", self.grid_size, self.grid_size, self.input_len, self.num_vectors);
        writeln!(f, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║               Systolic NPU Simulation Report                 ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Array:                     {:>20}               ║", shape)?;
        writeln!(f, "║ Total Cycles:              {:>12}                       ║", self.total_cycles)?;
        writeln!(f, "║ Load Cycles:               {:>12}                       ║", self.load_cycles)?;
        writeln!(f, "║ Compute Cycles:            {:>12}                       ║", self.compute_cycles)?;
        writeln!(f, "║ Input Cycles:              {:>12}                       ║", self.input_cycles)?;
        writeln!(f, "║ Result Cycles:             {:>12}                       ║", self.result_cycles)?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ MAC Operations:            {:>12}                       ║", self.mac_operations)?;
        writeln!(f, "║ Nonzero Outputs:           {:>12}                       ║", self.nonzero_outputs)?;
        writeln!(f, "║ Overflow Warnings:         {:>12}                       ║", self.overflow_warnings)?;
        writeln!(f, "║ Trace Emissions:           {:>12}                       ║", self.trace_emissions)?;
        writeln!(f, "║ Stray Outputs:             {:>12}                       ║", self.stray_outputs)?;
        writeln!(f, "║ Complete:                  {:>12}                       ║", self.complete)?;
        writeln!(f, "╚══════════════════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalOrder;
    use crate::workloads::WorkloadConfig;

    const DENSE_DEMO_RESULTS: [[Word; 8]; 4] = [
        [5303, -1039, -5199, -1349, -4186, -17068, 9277, -14632],
        [9991, 3951, -5379, -3812, -5093, -20089, 7873, -14792],
        [7818, 2587, -4978, -4175, -5385, -19360, 8048, -13874],
        [21627, 17676, -3626, -9303, -5830, -19745, 985, -8875],
    ];

    fn expected_product(config: &NpuConfig) -> Vec<Vec<Word>> {
        (0..config.num_vectors)
            .map(|v| {
                (0..config.grid_size)
                    .map(|j| {
                        (0..config.grid_size)
                            .map(|i| config.weights[i][j].wrapping_mul(config.inputs[i][v]))
                            .fold(0, Word::wrapping_add)
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_dense_demo_end_to_end() {
        let mut sim = Simulator::new(NpuConfig::dense_demo()).unwrap();
        let report = sim.run_to_completion().unwrap();

        assert!(report.complete);
        assert_eq!(report.total_cycles, 2 * 8 - 2 + 4 + 4);
        assert_eq!(report.input_cycles, 4 - 1 + 4);
        assert_eq!(report.result_cycles, 8 - 1 + 4);
        assert_eq!(report.overflow_warnings, 0);
        assert_eq!(report.stray_outputs, 0);
        let expected: Vec<Vec<Word>> = DENSE_DEMO_RESULTS.iter().map(|r| r.to_vec()).collect();
        assert_eq!(report.results, expected);
        assert_eq!(report.results, expected_product(sim.config()));
    }

    #[test]
    fn test_weights_loaded_after_n_cycles() {
        let config = NpuConfig::dense_demo();
        let mut sim = Simulator::new(config.clone()).unwrap();
        assert_eq!(sim.phase(), Phase::Load);
        sim.load_weights().unwrap();
        assert_eq!(sim.phase(), Phase::Compute);
        assert_eq!(sim.clock().cycle, 8);
        assert_eq!(sim.grid().weights(), config.weights);
        assert_eq!(sim.stats().load_cycles, 8);
    }

    #[test]
    fn test_first_output_at_output_start() {
        let mut sim = Simulator::new(NpuConfig::dense_demo()).unwrap();
        let start = sim.thresholds().output_start();
        assert_eq!(start, 11);

        while !sim.is_complete() {
            let report = sim.step().unwrap();
            if report.cycle < start {
                assert!(report.outputs.iter().all(|&x| x == 0), "cycle {}", report.cycle);
            }
            if report.cycle == start {
                assert_eq!(report.outputs[0], 5303);
                assert!(report.outputs[1..].iter().all(|&x| x == 0));
            }
        }
    }

    #[test]
    fn test_outputs_zero_outside_emission_cycles() {
        let mut sim = Simulator::new(NpuConfig::dense_demo()).unwrap();
        let t = *sim.thresholds();
        for _ in 0..t.completion_cycle() + 5 {
            let report = sim.step().unwrap();
            for (col, &x) in report.outputs.iter().enumerate() {
                let in_window = (0..t.num_vectors).any(|v| t.emission_cycle(v, col) == report.cycle);
                if !in_window {
                    assert_eq!(x, 0, "column {} at cycle {}", col, report.cycle);
                }
            }
        }
        assert_eq!(sim.stats().nonzero_outputs, 4 * 8);
    }

    #[test]
    fn test_counters_match_closed_form() {
        let mut sim = Simulator::new(NpuConfig::dense_demo()).unwrap();
        let t = *sim.thresholds();
        for _ in 0..t.completion_cycle() + 3 {
            sim.step().unwrap();
            let clock = *sim.clock();
            assert_eq!(clock.input_cycles, t.input_cycles_at(clock.cycle));
            assert_eq!(clock.result_cycles, t.result_cycles_at(clock.cycle));
        }
    }

    #[test]
    fn test_inputs_enter_with_skew() {
        let config = NpuConfig::dense_demo();
        let mut sim = Simulator::new(config.clone()).unwrap();
        sim.load_weights().unwrap();
        let t = *sim.thresholds();
        for _ in 0..t.input_window().end - t.input_start() {
            let report = sim.step().unwrap();
            for m in 0..t.input_len {
                let v = (0..t.num_vectors).find(|&v| t.injection_cycle(v, m) == report.cycle);
                let expected = v.map_or(0, |v| config.inputs[config.band_start() + m][v]);
                assert_eq!(report.input_outputs[m], expected);
            }
        }
    }

    #[test]
    fn test_single_element_overflow() {
        let config = NpuConfig::from_matrices(vec![vec![200]], vec![vec![200]]);
        let mut sim = Simulator::new(config).unwrap();
        let report = sim.run_to_completion().unwrap();

        assert_eq!(report.overflow_warnings, 1);
        assert_eq!(
            sim.stats().overflow_log,
            vec![(1, Overflow { row: 0, col: 0, value: 40000 })]
        );
        // native value kept
        assert_eq!(report.results, vec![vec![40000]]);
    }

    #[test]
    fn test_overflow_once_per_element_per_cycle() {
        let config = NpuConfig::from_matrices(vec![vec![200, 200], vec![200, 200]], vec![vec![200], vec![200]]);
        let mut sim = Simulator::new(config).unwrap();
        let report = sim.run_to_completion().unwrap();

        let log: Vec<(u64, usize, usize)> = sim
            .stats()
            .overflow_log
            .iter()
            .map(|(cycle, o)| (*cycle, o.row, o.col))
            .collect();
        assert_eq!(log, vec![(2, 0, 0), (3, 0, 1), (3, 1, 0), (4, 1, 1)]);
        assert_eq!(report.overflow_warnings, 4);
        assert!(report.complete);
        assert_eq!(report.results, vec![vec![80000, 80000]]);
    }

    #[test]
    fn test_full_width_overflows_without_halting() {
        let config = NpuConfig::full_width();
        let mut sim = Simulator::new(config.clone()).unwrap();
        let report = sim.run_to_completion().unwrap();
        assert!(report.overflow_warnings > 0);
        assert_eq!(report.results, expected_product(&config));
    }

    #[test]
    fn test_eval_orders_produce_identical_traces() {
        let orders = [EvalOrder::RowMajor, EvalOrder::ColumnMajor, EvalOrder::Reverse, EvalOrder::Parallel];
        let traces: Vec<Vec<String>> = orders
            .iter()
            .map(|&order| {
                let mut config = NpuConfig::full_width();
                config.eval_order = order;
                let mut sim = Simulator::new(config).unwrap();
                let completion = sim.thresholds().completion_cycle();
                (0..completion)
                    .map(|_| {
                        sim.step().unwrap();
                        sim.render_trace()
                    })
                    .collect()
            })
            .collect();
        for other in &traces[1..] {
            assert_eq!(&traces[0], other);
        }
    }

    #[test]
    fn test_synthetic_workloads_match_product() {
        for (n, l, k) in [(1, 1, 1), (3, 2, 5), (5, 5, 2), (6, 1, 3), (7, 4, 4)] {
            let config = WorkloadConfig {
                grid_size: n,
                input_len: l,
                num_vectors: k,
                magnitude: 50,
                seed: (n * 100 + l * 10 + k) as u64,
            }
            .generate();
            let mut sim = Simulator::new(config.clone()).unwrap();
            let report = sim.run_to_completion().unwrap();
            assert_eq!(report.results, expected_product(&config), "N={} L={} K={}", n, l, k);
        }
    }

    #[test]
    fn test_trace_written_every_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mac_matrix_info.txt");
        let mut config = NpuConfig::tiny();
        config.trace.enabled = true;
        config.trace.path = path.clone();

        let mut sim = Simulator::new(config).unwrap();
        sim.run(5).unwrap();
        assert_eq!(sim.trace_emitter().unwrap().emissions(), 5);

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, sim.render_trace());
        assert!(on_disk.ends_with("Total cycles:  5\nTotal input cycles:  3\nTotal result cycles:  2\n"));
        // rendering again without a step changes nothing
        assert_eq!(sim.render_trace(), on_disk);
    }

    #[test]
    fn test_trace_failure_does_not_stop_simulation() {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = Simulator::new(NpuConfig::tiny()).unwrap();
        sim.set_trace(Some(TraceEmitter::new(dir.path().join("absent").join("trace.txt"))));
        let report = sim.run_to_completion().unwrap();
        assert!(report.complete);
        assert_eq!(report.trace_emissions, 0);
        assert!(sim.trace_emitter().unwrap().failures() > 0);
        assert_eq!(report.results, vec![vec![3, 4], vec![5, 6]]);
    }

    #[test]
    fn test_step_after_stop_fails() {
        let mut sim = Simulator::new(NpuConfig::tiny()).unwrap();
        sim.apply(&Command::Step).unwrap();
        assert_eq!(sim.apply(&Command::Stop).unwrap(), None);
        assert!(sim.is_stopped());
        match sim.step() {
            Err(NpuError::SimulationStopped { cycle }) => assert_eq!(cycle, 1),
            other => panic!("expected stop error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        let mut sim = Simulator::new(NpuConfig::dense_demo()).unwrap();
        sim.run(10).unwrap();
        let clock = *sim.clock();
        let elements = sim.grid().elements().to_vec();
        let trace = sim.render_trace();

        let result = sim.apply(&Command::Unknown("reset".into())).unwrap();
        assert!(result.is_none());
        assert_eq!(*sim.clock(), clock);
        assert_eq!(sim.grid().elements(), elements.as_slice());
        assert_eq!(sim.render_trace(), trace);
    }

    #[test]
    fn test_report_incomplete_mid_run() {
        let mut sim = Simulator::new(NpuConfig::dense_demo()).unwrap();
        let completion = sim.thresholds().completion_cycle();
        sim.run(completion - 1).unwrap();
        let report = sim.report();
        assert!(!report.complete);
        assert_eq!(report.stray_outputs, 0);

        sim.step().unwrap();
        assert!(sim.report().complete);
    }

    #[test]
    fn test_no_stray_outputs_after_completion() {
        let mut sim = Simulator::new(NpuConfig::full_width()).unwrap();
        let completion = sim.thresholds().completion_cycle();
        sim.run(completion + 10).unwrap();
        let report = sim.report();
        assert!(report.complete);
        assert_eq!(report.stray_outputs, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = NpuConfig::dense_demo();
        config.weights.pop();
        assert!(matches!(Simulator::new(config), Err(NpuError::Config { .. })));
    }

    #[test]
    fn test_report_serializes() {
        let mut sim = Simulator::new(NpuConfig::tiny()).unwrap();
        let report = sim.run_to_completion().unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let back: SimulationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert!(report.to_string().contains("Systolic NPU Simulation Report"));
    }
}
