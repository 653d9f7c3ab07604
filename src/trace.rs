//! Trace emitter: a textual dump of the whole grid and the cycle counters,
//! laid out for side-by-side comparison against the reference computation.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::grid::Grid;
use crate::schedule::Clock;

#[derive(Debug, Clone)]
pub struct TraceEmitter {
    path: PathBuf,
    emissions: u64,
    failures: u64,
}

impl TraceEmitter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TraceEmitter {
            path: path.into(),
            emissions: 0,
            failures: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Successful emissions so far
    pub fn emissions(&self) -> u64 {
        self.emissions
    }

    /// Emissions skipped because the destination could not be written
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Render and write the trace. A write failure is logged and the
    /// emission skipped; simulator state is never touched.
    pub fn emit(&mut self, grid: &Grid, enable: bool, clock: &Clock) -> bool {
        let text = render(grid, enable, clock);
        match std::fs::write(&self.path, text) {
            Ok(()) => {
                self.emissions += 1;
                debug!("trace written to {} at cycle {}", self.path.display(), clock.cycle);
                true
            }
            Err(e) => {
                self.failures += 1;
                warn!("could not write trace to {}: {}; skipping", self.path.display(), e);
                false
            }
        }
    }
}

fn cell(label: &str, value: impl Display, width: usize) -> String {
    let value = value.to_string();
    let pad = width.saturating_sub(value.len());
    format!("{}{}{:>pad$}", label, value, "| ", pad = pad)
}

/// Full grid dump: one block per grid row, then the cycle totals
pub fn render(grid: &Grid, enable: bool, clock: &Clock) -> String {
    let n = grid.size();
    let mut out = String::new();

    for r in 0..n {
        let row = grid.row(r);
        let lines: [String; 6] = [
            row.iter().map(|pe| cell("MAC ", pe.id(n), 15)).collect(),
            row.iter().map(|pe| cell("Input  = ", pe.current_input, 10)).collect(),
            row.iter().map(|pe| cell("Sum    = ", pe.sum, 10)).collect(),
            row.iter().map(|_| cell("Enable = ", u8::from(enable), 10)).collect(),
            row.iter().map(|pe| cell("Weight = ", pe.weight, 10)).collect(),
            row.iter().map(|pe| cell("Result = ", pe.result, 10)).collect(),
        ];
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(&"-".repeat(20 * n));
        out.push('\n');
    }

    out.push_str(&format!("Total cycles:  {}\n", clock.cycle));
    out.push_str(&format!("Total input cycles:  {}\n", clock.input_cycles));
    out.push_str(&format!("Total result cycles:  {}\n", clock.result_cycles));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalOrder;
    use crate::loader::WeightLoader;

    fn sample_grid() -> Grid {
        let mut grid = Grid::new(2, 16, EvalOrder::RowMajor);
        WeightLoader::new(vec![vec![-58, 7], vec![3, 120]]).load_all(&mut grid);
        grid.push_left_edge(&[77, 0]);
        grid.beat(false);
        grid
    }

    #[test]
    fn test_cell_alignment() {
        assert_eq!(cell("MAC ", 0, 15), format!("MAC 0{}| ", " ".repeat(12)));
        assert_eq!(cell("Sum    = ", -4466, 10), format!("Sum    = -4466{}| ", " ".repeat(3)));
        // values wider than the column still get a separator
        assert_eq!(cell("Sum    = ", 1234567890, 10), "Sum    = 1234567890| ");
    }

    #[test]
    fn test_render_layout() {
        let grid = sample_grid();
        let clock = Clock { cycle: 3, input_cycles: 1, result_cycles: 0 };
        let text = render(&grid, false, &clock);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2 * 7 + 3);
        assert!(lines[0].starts_with("MAC 0"));
        assert!(lines[0].contains("MAC 1"));
        assert!(lines[1].starts_with("Input  = 77"));
        assert!(lines[3].starts_with("Enable = 0"));
        assert!(lines[4].starts_with("Weight = -58"));
        assert!(lines[5].starts_with(&format!("Result = {}", -58 * 77)));
        assert_eq!(lines[6], "-".repeat(40));
        assert_eq!(lines[14], "Total cycles:  3");
        assert_eq!(lines[15], "Total input cycles:  1");
        assert_eq!(lines[16], "Total result cycles:  0");
    }

    #[test]
    fn test_emission_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let grid = sample_grid();
        let clock = Clock { cycle: 3, input_cycles: 1, result_cycles: 0 };
        let mut emitter = TraceEmitter::new(&path);

        assert!(emitter.emit(&grid, false, &clock));
        let first = std::fs::read(&path).unwrap();
        assert!(emitter.emit(&grid, false, &clock));
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(emitter.emissions(), 2);
    }

    #[test]
    fn test_write_failure_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("trace.txt");
        let grid = sample_grid();
        let before = grid.elements().to_vec();
        let mut emitter = TraceEmitter::new(&path);

        assert!(!emitter.emit(&grid, false, &Clock::default()));
        assert_eq!(emitter.failures(), 1);
        assert_eq!(emitter.emissions(), 0);
        assert_eq!(grid.elements(), before.as_slice());
    }
}
