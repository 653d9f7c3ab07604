//! NPU Console - Interactive Stepper
//!
//! Steps the simulator one cycle per trigger and prints what moved.
//! Enter, space or `s` steps, `q` stops, anything else is ignored.

use colored::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use systolic_npu_sim::prelude::*;

fn main() {
    env_logger::init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => match NpuConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        },
        None => NpuConfig::default(),
    };

    if let Err(e) = run_console(config) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}

fn run_console(config: NpuConfig) -> Result<()> {
    println!("{}", "╔══════════════════════════════════════════════════════════════════════╗".bright_cyan());
    println!("{}", "║    Systolic NPU Console                                              ║".bright_cyan());
    println!("{}", "║    Enter / s: step one cycle    q: stop                              ║".bright_cyan());
    println!("{}", "╚══════════════════════════════════════════════════════════════════════╝".bright_cyan());
    println!();

    let t = config.thresholds();
    println!(
        "{}x{} grid, {} vectors; inputs from cycle {}, outputs from cycle {}, done after {}",
        t.grid_size,
        t.grid_size,
        t.num_vectors,
        t.input_start(),
        t.output_start(),
        t.completion_cycle()
    );
    println!();

    let mut sim = Simulator::new(config)?;
    let stdin = io::stdin();

    loop {
        let Some(line) = read_line(&stdin, &format!("[cycle {}] > ", sim.clock().cycle))? else {
            break;
        };
        let command = Command::from_line(&line);

        match sim.apply(&command)? {
            Some(report) => print_cycle(&sim, &report),
            None if sim.is_stopped() => break,
            None => println!("{}", "(ignored)".dimmed()),
        }
    }

    println!();
    println!("{}", sim.report());
    for (v, row) in sim.results().iter().enumerate() {
        println!("  vector {}: {:?}", v, row);
    }
    Ok(())
}

/// `None` once stdin is closed
fn read_line(stdin: &io::Stdin, prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    let read = stdin.lock().read_line(&mut input)?;
    Ok((read > 0).then_some(input))
}

fn print_cycle(sim: &Simulator, report: &CycleReport) {
    let clock = sim.clock();
    match report.phase {
        Phase::Load => println!(
            "{} cycle {}: weight row {} injected",
            "load".yellow(),
            report.cycle,
            sim.config().grid_size as u64 - 1 - report.cycle
        ),
        Phase::Compute => {
            println!(
                "{} cycle {}: in {:?} out {:?}",
                "compute".green(),
                report.cycle,
                report.input_outputs,
                report.outputs
            );
        }
    }
    for o in &report.overflows {
        println!("  {} MAC ({}, {}) = {}", "overflow".red(), o.row, o.col, o.value);
    }
    println!(
        "  input cycles {}, result cycles {}{}",
        clock.input_cycles,
        clock.result_cycles,
        if sim.is_complete() { ", all outputs emitted" } else { "" }
    );
}
