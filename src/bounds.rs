//! Live typing rectangle in grid coordinates
//!
//! Margins are pixel insets from the page edges. Bounds snap them to the cell
//! grid so no glyph, including its ascent and descent bleed, crosses a margin.

use crate::coordinates::{GridPos, Mu, GRID_DIV};
use crate::metrics::CellMetrics;
use serde::{Deserialize, Serialize};

/// Line-height factors a document may use
pub const LINE_HEIGHT_FACTORS: [f32; 5] = [1.0, 1.5, 2.0, 2.5, 3.0];

/// Margin insets from each page edge, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            left: 96.0,
            right: 96.0,
            top: 96.0,
            bottom: 96.0,
        }
    }
}

impl Margins {
    /// Clamp every inset into `[0, extent / 2)` of its axis
    pub fn sanitized(self, page_w: f32, page_h: f32) -> Self {
        let clamp = |v: f32, extent: f32| {
            if v.is_finite() {
                v.clamp(0.0, (extent / 2.0 - 1.0).max(0.0))
            } else {
                0.0
            }
        };
        Self {
            left: clamp(self.left, page_w),
            right: clamp(self.right, page_w),
            top: clamp(self.top, page_h),
            bottom: clamp(self.bottom, page_h),
        }
    }
}

/// Whether `factor` is one of the allowed line-height settings
pub fn is_allowed_line_height(factor: f32) -> bool {
    LINE_HEIGHT_FACTORS.iter().any(|f| (f - factor).abs() < 1e-3)
}

/// Distance between typed lines for a line-height factor
pub fn line_step(factor: f32) -> Mu {
    Mu(((GRID_DIV as f32 * factor).round() as i32).max(1))
}

/// Page geometry and cell metrics everything else is laid out against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub cells: CellMetrics,
    pub line_step: Mu,
}

impl PageLayout {
    pub fn mu_px(&self) -> f32 {
        self.cells.mu_px()
    }

    pub fn col_x(&self, col: i32) -> f32 {
        col as f32 * self.cells.cell_width
    }

    pub fn row_y(&self, row: Mu) -> f32 {
        row.to_px(self.mu_px())
    }

    /// Cell under a page-space point
    pub fn hit_test(&self, x: f32, y: f32) -> (Mu, i32) {
        let col = if self.cells.cell_width > 0.0 {
            (x / self.cells.cell_width).floor() as i32
        } else {
            0
        };
        (Mu::floor_from_px(y, self.mu_px()), col)
    }
}

/// The typable rectangle: inclusive columns and inclusive baseline rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub right: i32,
    pub top: Mu,
    pub bottom: Mu,
}

impl Bounds {
    pub fn compute(layout: &PageLayout, margins: Margins) -> Self {
        let margins = margins.sanitized(layout.page_width, layout.page_height);
        let cell = layout.cells.cell_width;
        let mu_px = layout.mu_px();
        let font = layout.cells.font;

        let (left, right) = if cell > 0.0 {
            let left = (margins.left / cell - 1e-4).ceil() as i32;
            let right_edge = if margins.right < cell / 2.0 {
                layout.page_width
            } else {
                layout.page_width - margins.right
            };
            let right = (right_edge / cell + 1e-4).floor() as i32 - 1;
            (left, right.max(left))
        } else {
            (0, 0)
        };

        let top = Mu::ceil_from_px(margins.top + font.ascent_px, mu_px);
        let bottom = Mu::floor_from_px(layout.page_height - margins.bottom - font.descent_px, mu_px);

        Self {
            left,
            right,
            top,
            bottom: bottom.max(top),
        }
    }

    /// Number of typable columns
    pub fn width(&self) -> i32 {
        self.right - self.left + 1
    }

    /// Lowest baseline reachable from `top` in whole line steps
    pub fn last_line(&self, step: Mu) -> Mu {
        if step.0 <= 0 {
            return self.top;
        }
        let lines = (self.bottom.0 - self.top.0) / step.0;
        Mu(self.top.0 + lines * step.0)
    }

    /// Row one line below `row`, or `None` when that falls past the bottom
    pub fn next_line(&self, row: Mu, step: Mu) -> Option<Mu> {
        let next = row + step;
        (next <= self.last_line(step)).then_some(next)
    }

    /// Number of line slots on a page
    pub fn lines_per_page(&self, step: Mu) -> i32 {
        if step.0 <= 0 {
            return 1;
        }
        (self.last_line(step).0 - self.top.0) / step.0 + 1
    }

    /// Clamp into the rectangle and snap the row onto the line step.
    ///
    /// The column may sit one past `right`: that is the pending-wrap position
    /// after a character lands on the last column.
    pub fn clamp(&self, pos: GridPos, step: Mu) -> GridPos {
        let col = pos.col.clamp(self.left, self.right + 1);
        let last = self.last_line(step);
        let row = pos.row.clamp(self.top, last);
        let row = if step.0 > 0 {
            let k = ((row.0 - self.top.0) as f32 / step.0 as f32).round() as i32;
            Mu(self.top.0 + k * step.0).min(last)
        } else {
            row
        };
        GridPos::new(pos.page, row, col)
    }

    /// Top-left typing position of a page
    pub fn origin(&self, page: usize) -> GridPos {
        GridPos::new(page, self.top, self.left)
    }
}
