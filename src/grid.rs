//! Sparse character grid with layered cells
//!
//! A page's grid maps row (mu) -> column -> stack of glyph strikes, most recent
//! last. Empty stacks and empty rows are never stored, so every walk over the
//! grid is proportional to the number of occupied cells.

use crate::coordinates::Mu;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Ribbon colour a glyph was struck with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ink {
    Black,
    Red,
    /// Correction ink: always drawn at full opacity over whatever is beneath
    White,
}

impl Ink {
    pub const ALL: [Ink; 3] = [Ink::Black, Ink::Red, Ink::White];

    pub fn index(self) -> usize {
        match self {
            Ink::Black => 0,
            Ink::Red => 1,
            Ink::White => 2,
        }
    }

    /// Straight RGB of the ribbon
    pub fn rgb(self) -> [u8; 3] {
        match self {
            Ink::Black => [0x1b, 0x1a, 0x1c],
            Ink::Red => [0xb0, 0x1e, 0x23],
            Ink::White => [0xff, 0xff, 0xff],
        }
    }
}

/// One strike at a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Glyph {
    #[serde(rename = "char")]
    pub ch: char,
    pub ink: Ink,
}

impl Glyph {
    pub const fn new(ch: char, ink: Ink) -> Self {
        Self { ch, ink }
    }
}

/// Draw-ordered strikes at one cell
pub type CellStack = Vec<Glyph>;

/// Columns of one row
pub type RowMap = BTreeMap<i32, CellStack>;

/// Rows touched by a mutation, for dirty tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Touched {
    pub page: usize,
    pub rows: RangeInclusive<Mu>,
}

impl Touched {
    pub fn row(page: usize, row: Mu) -> Self {
        Self {
            page,
            rows: row..=row,
        }
    }
}

/// Sparse matrix of one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    rows: BTreeMap<Mu, RowMap>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Occupied rows in increasing order
    pub fn rows(&self) -> impl DoubleEndedIterator<Item = (Mu, &RowMap)> + '_ {
        self.rows.iter().map(|(row, map)| (*row, map))
    }

    /// Occupied rows within `range`, in increasing order
    pub fn rows_in(&self, range: RangeInclusive<Mu>) -> impl Iterator<Item = (Mu, &RowMap)> + '_ {
        self.rows.range(range).map(|(row, map)| (*row, map))
    }

    pub fn row(&self, row: Mu) -> Option<&RowMap> {
        self.rows.get(&row)
    }

    pub fn stack(&self, row: Mu, col: i32) -> Option<&[Glyph]> {
        self.rows
            .get(&row)
            .and_then(|cells| cells.get(&col))
            .map(|stack| stack.as_slice())
    }

    /// Most recent strike at a cell
    pub fn top(&self, row: Mu, col: i32) -> Option<Glyph> {
        self.stack(row, col).and_then(|stack| stack.last().copied())
    }

    pub fn is_occupied(&self, row: Mu, col: i32) -> bool {
        self.stack(row, col).is_some()
    }

    /// First and last occupied column of a row
    pub fn occupied_span(&self, row: Mu) -> Option<(i32, i32)> {
        let cells = self.rows.get(&row)?;
        let first = *cells.keys().next()?;
        let last = *cells.keys().next_back()?;
        Some((first, last))
    }

    pub fn cell_count(&self) -> usize {
        self.rows.values().map(|cells| cells.len()).sum()
    }

    pub fn layer_count(&self) -> usize {
        self.rows
            .values()
            .flat_map(|cells| cells.values())
            .map(|stack| stack.len())
            .sum()
    }

    /// Strike one glyph per character starting at `start_col`
    pub fn write_run(&mut self, row: Mu, start_col: i32, text: &str, ink: Ink) {
        let mut col = start_col;
        for ch in text.chars() {
            self.overtype(row, col, ch, ink);
            col += 1;
        }
    }

    /// Strike a single glyph on top of whatever the cell holds
    pub fn overtype(&mut self, row: Mu, col: i32, ch: char, ink: Ink) {
        self.rows
            .entry(row)
            .or_default()
            .entry(col)
            .or_default()
            .push(Glyph::new(ch, ink));
    }

    /// Pop the top strike of `count` cells starting at `start_col`.
    ///
    /// Returns the number of cells that actually lost a layer.
    pub fn erase(&mut self, row: Mu, start_col: i32, count: usize) -> usize {
        let Some(cells) = self.rows.get_mut(&row) else {
            return 0;
        };
        let mut erased = 0;
        for col in start_col..start_col + count as i32 {
            if let Some(stack) = cells.get_mut(&col) {
                stack.pop();
                erased += 1;
                if stack.is_empty() {
                    cells.remove(&col);
                }
            }
        }
        if cells.is_empty() {
            self.rows.remove(&row);
        }
        erased
    }

    /// Remove a whole cell, history included
    pub fn take_cell(&mut self, row: Mu, col: i32) -> Option<CellStack> {
        let cells = self.rows.get_mut(&row)?;
        let stack = cells.remove(&col);
        if cells.is_empty() {
            self.rows.remove(&row);
        }
        stack
    }

    /// Lay a stack onto a cell, above any strikes already there
    pub fn put_cell(&mut self, row: Mu, col: i32, stack: CellStack) {
        if stack.is_empty() {
            return;
        }
        self.rows
            .entry(row)
            .or_default()
            .entry(col)
            .or_default()
            .extend(stack);
    }

    /// Replace the whole contents from serialized rows
    pub fn from_rows(rows: impl IntoIterator<Item = (Mu, Vec<(i32, CellStack)>)>) -> Self {
        let mut grid = Grid::new();
        for (row, cells) in rows {
            for (col, stack) in cells {
                grid.put_cell(row, col, stack);
            }
        }
        grid
    }

    /// Check the no-empty-stack / no-empty-row invariant
    pub fn is_sparse(&self) -> bool {
        self.rows
            .values()
            .all(|cells| !cells.is_empty() && cells.values().all(|stack| !stack.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: Mu = Mu(16);

    #[test]
    fn test_write_run_and_overtype_layers() {
        let mut grid = Grid::new();
        grid.write_run(R, 3, "ab", Ink::Black);
        grid.overtype(R, 3, 'x', Ink::Red);

        assert_eq!(
            grid.stack(R, 3),
            Some(&[Glyph::new('a', Ink::Black), Glyph::new('x', Ink::Red)][..])
        );
        assert_eq!(grid.top(R, 4), Some(Glyph::new('b', Ink::Black)));
        assert_eq!(grid.occupied_span(R), Some((3, 4)));
        assert_eq!(grid.cell_count(), 2);
        assert_eq!(grid.layer_count(), 3);
    }

    #[test]
    fn test_erase_pops_one_layer_and_prunes() {
        let mut grid = Grid::new();
        grid.write_run(R, 0, "ab", Ink::Black);
        grid.overtype(R, 0, '/', Ink::Black);

        assert_eq!(grid.erase(R, 0, 2), 2);
        assert_eq!(grid.top(R, 0), Some(Glyph::new('a', Ink::Black)));
        assert!(!grid.is_occupied(R, 1));

        assert_eq!(grid.erase(R, 0, 1), 1);
        assert!(grid.is_empty());
        assert!(grid.is_sparse());
        assert_eq!(grid.erase(R, 0, 1), 0);
    }

    #[test]
    fn test_take_and_put_cell_preserve_history() {
        let mut grid = Grid::new();
        grid.overtype(R, 5, 'o', Ink::Black);
        grid.overtype(R, 5, '-', Ink::Red);

        let stack = grid.take_cell(R, 5).unwrap();
        assert!(grid.is_empty());

        grid.put_cell(Mu(24), 0, stack.clone());
        assert_eq!(grid.stack(Mu(24), 0), Some(stack.as_slice()));
        grid.put_cell(Mu(24), 1, Vec::new());
        assert!(grid.is_sparse());
    }

    #[test]
    fn test_rows_iterate_in_order() {
        let mut grid = Grid::new();
        grid.overtype(Mu(40), 0, 'c', Ink::Black);
        grid.overtype(Mu(8), 0, 'a', Ink::Black);
        grid.overtype(Mu(24), 0, 'b', Ink::Black);
        let rows: Vec<Mu> = grid.rows().map(|(row, _)| row).collect();
        assert_eq!(rows, vec![Mu(8), Mu(24), Mu(40)]);
        let some: Vec<Mu> = grid.rows_in(Mu(10)..=Mu(40)).map(|(row, _)| row).collect();
        assert_eq!(some, vec![Mu(24), Mu(40)]);
    }
}
