//! Processing-element grid and the two-phase systolic beat.
//!
//! Elements live in a flat row-major `Vec`; neighbours are derived from
//! coordinates. A beat first evaluates every element against the state
//! committed by the previous beat (Phase 1), then commits the staged values
//! for the whole grid at once (Phase 2). Phase 1 never observes a value
//! written in the same beat, so the evaluation order is irrelevant.

use log::warn;
use rayon::prelude::*;

use crate::config::EvalOrder;
use crate::pe::{mac, ProcessingElement};
use crate::Word;

/// Values produced by Phase 1 for a single element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Staged {
    /// Operand consumed this beat
    pub operand: Word,
    /// MAC output, handed down as the next `pending_sum`
    pub result: Word,
    /// Committed weight, handed down as the next `pending_weight`
    pub weight: Word,
    /// Exact result, kept for overflow reporting
    pub exact: i64,
    pub overflow: bool,
}

/// Coordinates of an element whose accumulation left the signed range
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Overflow {
    pub row: usize,
    pub col: usize,
    pub value: i64,
}

/// What one beat hands to the rest of the system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeatOutcome {
    /// Bottom-row results, one per column, bound for the output sinks
    pub bottom: Vec<Word>,
    pub overflows: Vec<Overflow>,
}

#[derive(Debug, Clone)]
pub struct Grid {
    size: usize,
    accumulator_bits: u32,
    order: EvalOrder,
    elements: Vec<ProcessingElement>,
}

impl Grid {
    /// Build an N×N grid. Every register, including the column-0 inputs and
    /// the row-0 sums, starts at zero.
    pub fn new(size: usize, accumulator_bits: u32, order: EvalOrder) -> Self {
        let elements = (0..size * size)
            .map(|i| ProcessingElement::new(i / size, i % size))
            .collect();
        Grid {
            size,
            accumulator_bits,
            order,
            elements,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn eval_order(&self) -> EvalOrder {
        self.order
    }

    pub fn set_eval_order(&mut self, order: EvalOrder) {
        self.order = order;
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.size + col
    }

    pub fn get(&self, row: usize, col: usize) -> &ProcessingElement {
        &self.elements[self.index(row, col)]
    }

    pub fn elements(&self) -> &[ProcessingElement] {
        &self.elements
    }

    /// Elements of one grid row, left to right
    pub fn row(&self, row: usize) -> &[ProcessingElement] {
        let start = row * self.size;
        &self.elements[start..start + self.size]
    }

    pub fn left_of(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        (col > 0).then(|| (row, col - 1))
    }

    pub fn right_of(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        (col + 1 < self.size).then(|| (row, col + 1))
    }

    pub fn above(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        (row > 0).then(|| (row - 1, col))
    }

    /// `None` for the last row, whose results go to the output sink instead
    pub fn below(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        (row + 1 < self.size).then(|| (row + 1, col))
    }

    /// Stage a weight row at the top edge of the grid
    pub fn stage_weight_row(&mut self, weights: &[Word]) {
        let size = self.size;
        for (pe, &w) in self.elements[..size].iter_mut().zip(weights) {
            pe.pending_weight = w;
        }
    }

    /// Drive the left edge: `inputs[r]` becomes the column-0 operand of row `r`
    pub fn push_left_edge(&mut self, inputs: &[Word]) {
        for (r, &x) in inputs.iter().enumerate().take(self.size) {
            let i = self.index(r, 0);
            self.elements[i].current_input = x;
        }
    }

    /// Committed weights as an N×N matrix
    pub fn weights(&self) -> Vec<Vec<Word>> {
        (0..self.size)
            .map(|r| self.row(r).iter().map(|pe| pe.weight).collect())
            .collect()
    }

    /// Results of the most recent beat as an N×N matrix
    pub fn results(&self) -> Vec<Vec<Word>> {
        (0..self.size)
            .map(|r| self.row(r).iter().map(|pe| pe.result).collect())
            .collect()
    }

    /// Advance every element by one cycle. `enable` gates the weight commit.
    pub fn beat(&mut self, enable: bool) -> BeatOutcome {
        if self.size == 0 {
            return BeatOutcome::default();
        }
        let staged = self.evaluate_all();
        self.commit(&staged, enable)
    }

    /// Phase 1 for a single element, from committed state only
    fn evaluate(&self, index: usize) -> Staged {
        let pe = &self.elements[index];
        let operand = match self.left_of(pe.row, pe.col) {
            Some((r, c)) => self.get(r, c).previous_input,
            None => pe.current_input,
        };
        let m = mac(pe.weight, operand, pe.sum, self.accumulator_bits);
        Staged {
            operand,
            result: m.value,
            weight: pe.weight,
            exact: m.exact,
            overflow: m.overflow,
        }
    }

    /// Phase 1 over the whole grid in the configured order
    fn evaluate_all(&self) -> Vec<Staged> {
        let total = self.elements.len();
        match self.order {
            EvalOrder::Parallel => (0..total)
                .into_par_iter()
                .map(|i| self.evaluate(i))
                .collect(),
            order => {
                let mut staged = vec![Staged::default(); total];
                for i in visit_order(order, self.size) {
                    staged[i] = self.evaluate(i);
                }
                staged
            }
        }
    }

    /// Phase 2: apply `staged` to every element
    fn commit(&mut self, staged: &[Staged], enable: bool) -> BeatOutcome {
        let size = self.size;
        let mut overflows = Vec::new();

        for i in 0..self.elements.len() {
            let (row, col) = (i / size, i % size);
            let s = staged[i];
            let from_above = (row > 0).then(|| staged[i - size]);
            let pe = &mut self.elements[i];

            match from_above {
                Some(above) => {
                    pe.pending_sum = above.result;
                    pe.pending_weight = above.weight;
                }
                None => pe.pending_sum = 0,
            }
            pe.sum = pe.pending_sum;
            if enable {
                pe.weight = pe.pending_weight;
            }
            if col > 0 {
                pe.current_input = s.operand;
            }
            pe.previous_input = s.operand;
            pe.result = s.result;

            if s.overflow {
                warn!(
                    "PE {} ({}, {}): accumulation {} does not fit in a signed {}-bit register",
                    i, row, col, s.exact, self.accumulator_bits
                );
                overflows.push(Overflow {
                    row,
                    col,
                    value: s.exact,
                });
            }
        }

        let bottom = staged[(size - 1) * size..].iter().map(|s| s.result).collect();
        BeatOutcome { bottom, overflows }
    }
}

/// Element indices in the order a sequential Phase 1 visits them
fn visit_order(order: EvalOrder, size: usize) -> Vec<usize> {
    let total = size * size;
    match order {
        EvalOrder::RowMajor | EvalOrder::Parallel => (0..total).collect(),
        EvalOrder::ColumnMajor => (0..size)
            .flat_map(|c| (0..size).map(move |r| r * size + c))
            .collect(),
        EvalOrder::Reverse => (0..total).rev().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(weights: &[Vec<Word>], order: EvalOrder) -> Grid {
        let n = weights.len();
        let mut grid = Grid::new(n, 16, order);
        for i in 0..n {
            grid.stage_weight_row(&weights[n - 1 - i]);
            grid.beat(true);
        }
        grid
    }

    #[test]
    fn test_neighbours_by_coordinate() {
        let grid = Grid::new(3, 16, EvalOrder::RowMajor);
        assert_eq!(grid.right_of(1, 1), Some((1, 2)));
        assert_eq!(grid.right_of(1, 2), None);
        assert_eq!(grid.below(1, 1), Some((2, 1)));
        assert_eq!(grid.below(2, 0), None);
        assert_eq!(grid.left_of(0, 0), None);
        assert_eq!(grid.above(0, 2), None);
        assert_eq!(grid.get(2, 1).id(3), 7);
    }

    #[test]
    fn test_edges_preseeded_to_zero() {
        let grid = Grid::new(4, 16, EvalOrder::RowMajor);
        for r in 0..4 {
            assert_eq!(grid.get(r, 0).current_input, 0);
        }
        for c in 0..4 {
            assert_eq!(grid.get(0, c).sum, 0);
            assert_eq!(grid.get(0, c).pending_sum, 0);
        }
    }

    #[test]
    fn test_first_mac_uses_committed_state() {
        let mut grid = Grid::new(2, 16, EvalOrder::RowMajor);
        grid.stage_weight_row(&[3, 4]);
        grid.beat(true);
        // weight committed at the end of the beat, so this beat multiplied
        // by the old (zero) weight
        assert_eq!(grid.get(0, 0).weight, 3);
        assert_eq!(grid.get(0, 0).result, 0);

        grid.push_left_edge(&[5, 0]);
        grid.beat(false);
        assert_eq!(grid.get(0, 0).result, 15);
    }

    #[test]
    fn test_weights_frozen_without_enable() {
        let mut grid = loaded(&[vec![1, 2], vec![3, 4]], EvalOrder::RowMajor);
        grid.stage_weight_row(&[100, 100]);
        grid.beat(false);
        grid.beat(false);
        assert_eq!(grid.weights(), vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_input_moves_one_column_per_beat() {
        let mut grid = Grid::new(3, 16, EvalOrder::RowMajor);
        grid.push_left_edge(&[7, 0, 0]);
        grid.beat(false);
        assert_eq!(grid.get(0, 0).current_input, 7);
        assert_eq!(grid.get(0, 0).previous_input, 7);

        grid.push_left_edge(&[0, 0, 0]);
        grid.beat(false);
        assert_eq!(grid.get(0, 1).current_input, 7);
        assert_eq!(grid.get(0, 0).current_input, 0);
        grid.beat(false);
        assert_eq!(grid.get(0, 2).current_input, 7);
        assert_eq!(grid.get(0, 1).current_input, 0);
    }

    #[test]
    fn test_partial_sum_moves_one_row_per_beat() {
        let mut grid = loaded(&[vec![2, 0], vec![10, 0]], EvalOrder::RowMajor);
        grid.push_left_edge(&[1, 0]);
        let first = grid.beat(false);
        assert_eq!(grid.get(0, 0).result, 2);
        assert_eq!(first.bottom, vec![0, 0]);
        assert_eq!(grid.get(1, 0).sum, 2);

        grid.push_left_edge(&[0, 1]);
        let second = grid.beat(false);
        // row 1 saw the row-0 sum from the previous beat plus its own product
        assert_eq!(second.bottom[0], 2 + 10);
    }

    #[test]
    fn test_bottom_row_reports_results() {
        let mut grid = loaded(&[vec![1, 1, 1], vec![1, 1, 1], vec![1, 1, 1]], EvalOrder::RowMajor);
        grid.push_left_edge(&[0, 0, 4]);
        let outcome = grid.beat(false);
        assert_eq!(outcome.bottom, vec![4, 0, 0]);
    }

    #[test]
    fn test_evaluation_order_independent() {
        let weights = vec![
            vec![3, -1, 4, 1],
            vec![-5, 9, -2, 6],
            vec![5, 3, -5, 8],
            vec![9, -7, 9, 3],
        ];
        let feed: Vec<Vec<Word>> = (0..12)
            .map(|t| (0..4).map(|r| ((t * 7 + r * 3) % 11) as Word - 5).collect())
            .collect();

        let run = |order: EvalOrder| {
            let mut grid = loaded(&weights, order);
            let mut bottoms = Vec::new();
            for inputs in &feed {
                grid.push_left_edge(inputs);
                bottoms.push(grid.beat(false).bottom);
            }
            (bottoms, grid.elements().to_vec())
        };

        let reference = run(EvalOrder::RowMajor);
        for order in [EvalOrder::ColumnMajor, EvalOrder::Reverse, EvalOrder::Parallel] {
            assert_eq!(run(order), reference, "{:?} diverged", order);
        }
    }

    #[test]
    fn test_overflow_reported_once_per_element() {
        let mut grid = loaded(&[vec![200]], EvalOrder::RowMajor);
        grid.push_left_edge(&[200]);
        let outcome = grid.beat(false);
        assert_eq!(
            outcome.overflows,
            vec![Overflow { row: 0, col: 0, value: 40_000 }]
        );
        // native width keeps the full value
        assert_eq!(outcome.bottom, vec![40_000]);
    }

    #[test]
    fn test_visit_orders_cover_grid() {
        for order in [EvalOrder::RowMajor, EvalOrder::ColumnMajor, EvalOrder::Reverse] {
            let mut visited = visit_order(order, 3);
            visited.sort_unstable();
            assert_eq!(visited, (0..9).collect::<Vec<_>>());
        }
    }
}
