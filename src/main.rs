//! Systolic NPU Simulator - Command Line Interface
//!
//! Usage:
//!   npu-sim run [OPTIONS]           Run to completion and verify the outputs
//!   npu-sim trace [OPTIONS]         Stop at a cycle and dump the grid trace
//!   npu-sim info [OPTIONS]          Show the pipeline schedule
//!   npu-sim init-config [OPTIONS]   Write a preset configuration as TOML

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;

use systolic_npu_sim::prelude::*;

#[derive(Parser)]
#[command(name = "npu-sim")]
#[command(about = "Cycle-accurate simulator for a weight-stationary systolic NPU")]
#[command(version)]
struct Cli {
    /// Output results in JSON format (for machine parsing)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulation until every output has been emitted
    Run {
        #[command(flatten)]
        source: ConfigSource,

        /// Write the grid trace to this file after every cycle
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Print what the gatekeepers emit on every compute cycle
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run up to a cycle and dump the grid trace
    Trace {
        #[command(flatten)]
        source: ConfigSource,

        /// Cycles to simulate before dumping (defaults to a full run)
        #[arg(short, long)]
        cycle: Option<u64>,

        /// Write the trace here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the closed-form schedule for a configuration
    Info {
        #[command(flatten)]
        source: ConfigSource,
    },

    /// Write a preset configuration to a TOML file
    InitConfig {
        #[arg(short, long, value_enum, default_value = "dense-demo")]
        preset: Preset,

        #[arg(short, long, default_value = "npu.toml")]
        output: PathBuf,
    },
}

/// Where the configuration comes from
#[derive(Args)]
struct ConfigSource {
    /// TOML configuration file (overrides --preset)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in configuration
    #[arg(short, long, value_enum, default_value = "dense-demo")]
    preset: Preset,

    /// Phase-1 evaluation order
    #[arg(short, long, value_enum)]
    eval_order: Option<OrderArg>,

    /// Grid size of the random workload
    #[arg(long, default_value = "8")]
    grid_size: usize,

    /// Active input rows of the random workload (defaults to the grid size)
    #[arg(long)]
    input_len: Option<usize>,

    /// Vector count of the random workload
    #[arg(long, default_value = "4")]
    vectors: usize,

    /// Seed of the random workload
    #[arg(long, default_value = "24301")]
    seed: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    DenseDemo,
    FullWidth,
    Tiny,
    /// Signed-byte matrices drawn from --seed
    Random,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    RowMajor,
    ColumnMajor,
    Reverse,
    Parallel,
}

impl From<OrderArg> for EvalOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::RowMajor => EvalOrder::RowMajor,
            OrderArg::ColumnMajor => EvalOrder::ColumnMajor,
            OrderArg::Reverse => EvalOrder::Reverse,
            OrderArg::Parallel => EvalOrder::Parallel,
        }
    }
}

impl ConfigSource {
    fn resolve(&self) -> Result<NpuConfig> {
        let mut config = match &self.config {
            Some(path) => NpuConfig::load(path)?,
            None => preset_config(self.preset, self),
        };
        if let Some(order) = self.eval_order {
            config.eval_order = order.into();
        }
        config.validate()?;
        Ok(config)
    }
}

fn preset_config(preset: Preset, source: &ConfigSource) -> NpuConfig {
    match preset {
        Preset::DenseDemo => NpuConfig::dense_demo(),
        Preset::FullWidth => NpuConfig::full_width(),
        Preset::Tiny => NpuConfig::tiny(),
        Preset::Random => WorkloadConfig {
            grid_size: source.grid_size,
            input_len: source.input_len.unwrap_or(source.grid_size),
            num_vectors: source.vectors,
            seed: source.seed,
            ..Default::default()
        }
        .generate(),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let json_output = cli.json;

    let outcome = match cli.command {
        Commands::Run { source, trace, verbose } => run_simulation(&source, trace, verbose, json_output),
        Commands::Trace { source, cycle, output } => dump_trace(&source, cycle, output, json_output),
        Commands::Info { source } => show_info(&source, json_output),
        Commands::InitConfig { preset, output } => init_config(preset, output, json_output),
    };

    if let Err(e) = outcome {
        if json_output {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        } else {
            eprintln!("{}: {}", "Error".red(), e);
        }
        std::process::exit(1);
    }
}

fn banner(title: &str) {
    println!("{}", "╔══════════════════════════════════════════════════════════════╗".cyan());
    println!("{}", format!("║ {:^60} ║", title).cyan());
    println!("{}", "╚══════════════════════════════════════════════════════════════╝".cyan());
    println!();
}

/// JSON output structure for simulation results
#[derive(serde::Serialize)]
struct SimulationOutput {
    report: SimulationReport,
    verification: Verification,
    overflows: Vec<(u64, Overflow)>,
    wall_clock_seconds: f64,
}

fn run_simulation(source: &ConfigSource, trace: Option<PathBuf>, verbose: bool, json_output: bool) -> Result<()> {
    if !json_output {
        banner("Systolic NPU Simulator");
    }

    let config = source.resolve()?;
    let t = config.thresholds();

    if !json_output {
        println!("Configuration:");
        println!("  • Grid: {}x{} ({} MAC units)", config.grid_size, config.grid_size, config.num_elements());
        println!("  • Active input rows: {} (grid rows {}..{})", t.input_len, config.band_start(), config.grid_size);
        println!("  • Vectors: {}", t.num_vectors);
        println!("  • Accumulator width: {} bits", config.accumulator_bits);
        println!("  • Evaluation order: {:?}", config.eval_order);
        println!();
    }

    let mut sim = Simulator::new(config.clone())?;
    if let Some(path) = trace {
        sim.set_trace(Some(TraceEmitter::new(path)));
    }

    if !json_output {
        println!("{}", "Running simulation...".yellow());
    }
    let start = std::time::Instant::now();
    while !sim.is_complete() {
        let cycle = sim.step()?;
        if verbose && !json_output && cycle.phase == Phase::Compute {
            println!(
                "  cycle {:>4}: in {:?} out {:?}",
                cycle.cycle, cycle.input_outputs, cycle.outputs
            );
        }
        for o in &cycle.overflows {
            if !json_output {
                println!(
                    "  {} cycle {}: MAC ({}, {}) accumulated {}",
                    "overflow".yellow(),
                    cycle.cycle,
                    o.row,
                    o.col,
                    o.value
                );
            }
        }
    }
    let elapsed = start.elapsed();

    let report = sim.report();
    let verification = Verification::new(&config, &report.results);

    if json_output {
        let output = SimulationOutput {
            report,
            verification,
            overflows: sim.stats().overflow_log.clone(),
            wall_clock_seconds: elapsed.as_secs_f64(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", "Simulation complete!".green());
    println!();
    println!("{}", report);

    println!("{}", "Outputs".cyan());
    for (v, row) in report.results.iter().enumerate() {
        println!("  vector {}: {:?}", v, row);
    }
    println!();

    if report.stray_outputs > 0 {
        println!(
            "{}: {} nonzero outputs outside their emission cycle",
            "Warning".yellow(),
            report.stray_outputs
        );
    }
    if verification.passed() {
        print!("{}", verification.to_string().green());
    } else {
        print!("{}", verification.to_string().red());
    }
    println!("Wall-clock time: {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn dump_trace(source: &ConfigSource, cycle: Option<u64>, output: Option<PathBuf>, json_output: bool) -> Result<()> {
    let config = source.resolve()?;
    let mut sim = Simulator::new(config)?;
    let target = cycle.unwrap_or_else(|| sim.thresholds().completion_cycle());
    sim.run(target)?;

    let text = sim.render_trace();
    match output {
        Some(path) => {
            std::fs::write(&path, &text)?;
            if !json_output {
                println!("{} {}", "Trace written to".green(), path.display());
            }
        }
        None if json_output => {
            let value = serde_json::json!({
                "clock": sim.clock(),
                "elements": sim.grid().elements(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// JSON output structure for schedule information
#[derive(serde::Serialize)]
struct ScheduleInfo {
    thresholds: Thresholds,
    load_cycles: u64,
    input_start: u64,
    output_start: u64,
    input_window: (u64, u64),
    result_window: (u64, u64),
    completion_cycle: u64,
    mac_units: usize,
}

fn show_info(source: &ConfigSource, json_output: bool) -> Result<()> {
    let config = source.resolve()?;
    let t = config.thresholds();
    let info = ScheduleInfo {
        thresholds: t,
        load_cycles: t.load_cycles(),
        input_start: t.input_start(),
        output_start: t.output_start(),
        input_window: (t.input_window().start, t.input_window().end),
        result_window: (t.result_window().start, t.result_window().end),
        completion_cycle: t.completion_cycle(),
        mac_units: config.num_elements(),
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    banner("Pipeline Schedule");
    println!("Array: {}x{}, L = {}, K = {}", t.grid_size, t.grid_size, t.input_len, t.num_vectors);
    println!("════════════════════════════════════════");
    println!("  • Weight load:        cycles 0..{}", info.load_cycles);
    println!("  • Input chain head:   cycle {}", info.input_start);
    println!("  • Output chain head:  cycle {}", info.output_start);
    println!("  • Input window:       [{}, {})", info.input_window.0, info.input_window.1);
    println!("  • Result window:      [{}, {})", info.result_window.0, info.result_window.1);
    println!("  • Complete after:     {} cycles", info.completion_cycle);
    println!();
    println!("{}", "Emission cycle per (vector, column)".cyan());
    for v in 0..t.num_vectors {
        let row: Vec<String> = (0..t.grid_size)
            .map(|j| format!("{:>4}", t.emission_cycle(v, j)))
            .collect();
        println!("  vector {:>2}: {}", v, row.join(""));
    }
    Ok(())
}

fn init_config(preset: Preset, output: PathBuf, json_output: bool) -> Result<()> {
    let source = ConfigSource {
        config: None,
        preset,
        eval_order: None,
        grid_size: 8,
        input_len: None,
        vectors: 4,
        seed: 24301,
    };
    let config = preset_config(preset, &source);
    config.save(&output)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{} {}", "Configuration written to".green(), output.display());
    }
    Ok(())
}
