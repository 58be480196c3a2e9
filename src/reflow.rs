//! Linearize / re-populate reflow
//!
//! The grid can be flattened into a token stream (cells, blanks, line breaks)
//! and replayed onto fresh pages under new bounds. Replay goes through the same
//! `Carriage` live typing uses, so a re-wrapped document looks exactly like one
//! typed fresh under the new margins.

use crate::bounds::Bounds;
use crate::coordinates::{GridPos, Mu};
use crate::grid::{CellStack, Touched};
use crate::page::Page;

/// One step of the flattened document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An occupied cell with its full strike history
    Cell(CellStack),
    /// An unoccupied column inside a row
    Space,
    Newline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linearized {
    pub tokens: Vec<Token>,
    /// Index of the token the caret sits in front of
    pub caret_offset: usize,
    /// Blank columns between the last cell before the caret and the caret.
    /// These never become tokens, so a far-right caret cannot add line breaks.
    pub caret_trail: i32,
}

impl Linearized {
    /// Number of cells before the caret
    pub fn cells_before_caret(&self) -> usize {
        self.tokens[..self.caret_offset]
            .iter()
            .filter(|t| matches!(t, Token::Cell(_)))
            .count()
    }
}

// === Carriage ===

/// Cells a word-wrap carried from the end of one line to the start of the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapMove {
    /// First column that moved, on the old line
    pub from: GridPos,
    /// Where that column landed
    pub to: GridPos,
}

impl WrapMove {
    /// Where `pos` ends up if it sat among the moved cells
    pub fn relocate(&self, pos: GridPos) -> GridPos {
        if pos.page == self.from.page && pos.row == self.from.row && pos.col >= self.from.col {
            GridPos::new(self.to.page, self.to.row, self.to.col + (pos.col - self.from.col))
        } else {
            pos
        }
    }
}

/// Moves across the pages striking cells, applying the wrap rule.
///
/// Every strike and every cell moved by a wrap is recorded in `touched`.
pub struct Carriage<'a> {
    pages: &'a mut Vec<Page>,
    bounds: Bounds,
    step: Mu,
    word_wrap: bool,
    pub pos: GridPos,
    /// A position that travels with the cells when a wrap moves them
    pub marker: Option<GridPos>,
    /// The most recent word-wrap, until the caller takes it
    pub last_wrap: Option<WrapMove>,
    pub touched: Vec<Touched>,
}

impl<'a> Carriage<'a> {
    pub fn new(pages: &'a mut Vec<Page>, bounds: Bounds, step: Mu, word_wrap: bool, pos: GridPos) -> Self {
        let mut carriage = Self {
            pages,
            bounds,
            step,
            word_wrap,
            pos,
            marker: None,
            last_wrap: None,
            touched: Vec::new(),
        };
        carriage.ensure_page(pos.page);
        carriage
    }

    fn ensure_page(&mut self, index: usize) {
        while self.pages.len() <= index {
            let next = self.pages.len();
            self.pages.push(Page::new(next));
        }
    }

    fn touch(&mut self, page: usize, row: Mu) {
        self.touched.push(Touched::row(page, row));
    }

    /// Carriage return plus line feed, rolling onto a new page past the bottom
    pub fn newline(&mut self) {
        self.pos.col = self.bounds.left;
        match self.bounds.next_line(self.pos.row, self.step) {
            Some(row) => self.pos.row = row,
            None => {
                self.pos.page += 1;
                self.pos.row = self.bounds.top;
                self.ensure_page(self.pos.page);
            }
        }
    }

    /// Make room if the carriage has run past the right bound.
    ///
    /// With word wrap, the trailing partial word moves to the next line;
    /// without a blank to break at (or without word wrap) it breaks hard.
    pub fn wrap_if_needed(&mut self) {
        if self.pos.col <= self.bounds.right {
            return;
        }
        let (page, row) = (self.pos.page, self.pos.row);
        let (left, right) = (self.bounds.left, self.bounds.right);

        let mut moved = Vec::new();
        let mut blank = None;
        if self.word_wrap {
            let grid = &self.pages[page].grid;
            blank = (left..=right).rev().find(|&col| !grid.is_occupied(row, col));
            if let Some(blank) = blank {
                let grid = &mut self.pages[page].grid;
                for col in blank + 1..=right {
                    if let Some(stack) = grid.take_cell(row, col) {
                        moved.push(stack);
                    }
                }
            }
        }
        if !moved.is_empty() {
            self.touch(page, row);
        }

        self.newline();
        if let Some(blank) = blank {
            let wrap = WrapMove {
                from: GridPos::new(page, row, blank + 1),
                to: self.pos,
            };
            self.marker = self.marker.map(|marker| wrap.relocate(marker));
            self.last_wrap = Some(wrap);
        }
        for stack in moved {
            let (page, row, col) = (self.pos.page, self.pos.row, self.pos.col);
            self.pages[page].grid.put_cell(row, col, stack);
            self.touch(page, row);
            self.pos.col += 1;
        }
    }

    /// Lay a cell stack at the carriage and advance. Returns where it landed.
    pub fn strike(&mut self, stack: CellStack) -> GridPos {
        self.wrap_if_needed();
        let at = self.pos;
        self.pages[at.page].grid.put_cell(at.row, at.col, stack);
        self.touch(at.page, at.row);
        self.pos.col += 1;
        at
    }

    /// Advance one blank column; at the bound the space becomes the line break
    pub fn space(&mut self) {
        if self.pos.col > self.bounds.right {
            self.newline();
        } else {
            self.pos.col += 1;
        }
    }

    /// Apply one token, returning where it landed after any wrap it caused
    pub fn apply(&mut self, token: &Token) -> GridPos {
        match token {
            Token::Cell(stack) => self.strike(stack.clone()),
            Token::Space if self.pos.col > self.bounds.right => {
                self.newline();
                self.pos
            }
            Token::Space => {
                let at = self.pos;
                self.pos.col += 1;
                at
            }
            Token::Newline => {
                let at = self.pos;
                self.newline();
                at
            }
        }
    }
}

// === Linearize ===

/// Global line number of a row, counting every line slot of earlier pages
fn line_index(bounds: &Bounds, step: Mu, page: usize, row: Mu) -> i64 {
    let per_page = bounds.lines_per_page(step) as i64;
    let slot = if step.0 > 0 {
        ((row.0 - bounds.top.0) as f32 / step.0 as f32).round().max(0.0) as i64
    } else {
        0
    };
    page as i64 * per_page + slot
}

/// Flatten every page into tokens under the bounds the grid was laid out with
pub fn linearize(pages: &[Page], bounds: &Bounds, step: Mu, caret: GridPos) -> Linearized {
    let mut tokens = Vec::new();
    let mut caret_offset = None;
    let mut caret_trail = 0;

    let last_page = pages
        .iter()
        .rposition(|page| !page.grid.is_empty())
        .map_or(caret.page, |last| last.max(caret.page));

    let mut prev_line: Option<i64> = None;
    for page_index in 0..=last_page {
        let grid = pages.get(page_index).map(|page| &page.grid);
        let mut rows: Vec<Mu> = grid.map(|g| g.rows().map(|(row, _)| row).collect()).unwrap_or_default();
        if caret.page == page_index && !rows.contains(&caret.row) {
            let at = rows.partition_point(|row| *row < caret.row);
            rows.insert(at, caret.row);
        }

        for row in rows {
            let line = line_index(bounds, step, page_index, row);
            let breaks = match prev_line {
                Some(prev) => (line - prev).max(1),
                None => line.max(0),
            };
            tokens.extend((0..breaks).map(|_| Token::Newline));
            prev_line = Some(prev_line.map_or(line, |prev| line.max(prev + 1)));

            let here = |col: i32| caret.page == page_index && caret.row == row && caret.col == col;
            let mut col = bounds.left;
            if let Some(cells) = grid.and_then(|g| g.row(row)) {
                for (&cell_col, stack) in cells {
                    while col < cell_col {
                        if caret_offset.is_none() && here(col) {
                            caret_offset = Some(tokens.len());
                        }
                        tokens.push(Token::Space);
                        col += 1;
                    }
                    if caret_offset.is_none() && here(cell_col) {
                        caret_offset = Some(tokens.len());
                    }
                    tokens.push(Token::Cell(stack.clone()));
                    col = col.max(cell_col + 1);
                }
            }
            if caret_offset.is_none() && caret.page == page_index && caret.row == row {
                caret_offset = Some(tokens.len());
                caret_trail = (caret.col - col).max(0);
            }
        }
    }

    let caret_offset = caret_offset.unwrap_or(tokens.len());
    while tokens.len() > caret_offset && tokens.last() == Some(&Token::Newline) {
        tokens.pop();
    }
    Linearized {
        tokens,
        caret_offset,
        caret_trail,
    }
}

// === Re-populate ===

/// Result of replaying tokens onto cleared pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebuilt {
    pub caret: GridPos,
    pub touched: Vec<Touched>,
}

/// Replay `linear` onto `pages`, whose grids must already be cleared
pub fn rebuild(pages: &mut Vec<Page>, linear: &Linearized, bounds: Bounds, step: Mu, word_wrap: bool) -> Rebuilt {
    let mut carriage = Carriage::new(pages, bounds, step, word_wrap, bounds.origin(0));
    for (i, token) in linear.tokens.iter().enumerate() {
        let landing = carriage.apply(token);
        if i == linear.caret_offset {
            carriage.marker = Some(landing);
        }
    }
    let mut caret = carriage.marker.unwrap_or(carriage.pos);
    caret.col += linear.caret_trail;
    Rebuilt {
        caret: bounds.clamp(caret, step),
        touched: std::mem::take(&mut carriage.touched),
    }
}
