//! One paginated sheet: its grid, its double buffer and its dirty region

use crate::coordinates::Mu;
use crate::grid::Grid;
use crate::raster::Surface;
use std::ops::RangeInclusive;

/// What needs repainting before the next frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Dirty {
    #[default]
    Clean,
    Rows { min: Mu, max: Mu },
    Full,
}

impl Dirty {
    pub fn is_clean(&self) -> bool {
        matches!(self, Dirty::Clean)
    }

    /// Widen to also cover `rows`
    pub fn add_rows(&mut self, rows: RangeInclusive<Mu>) {
        let (lo, hi) = (*rows.start(), *rows.end());
        *self = match *self {
            Dirty::Clean => Dirty::Rows { min: lo, max: hi },
            Dirty::Rows { min, max } => Dirty::Rows {
                min: min.min(lo),
                max: max.max(hi),
            },
            Dirty::Full => Dirty::Full,
        };
    }
}

/// Back and visible buffers of an active page
#[derive(Debug, Clone)]
pub struct Canvases {
    pub back: Surface,
    pub visible: Surface,
    /// Render scale the buffers were allocated for
    pub scale: f32,
}

impl Canvases {
    pub fn new(width: u32, height: u32, scale: f32) -> Self {
        Self {
            back: Surface::new(width, height),
            visible: Surface::new(width, height),
            scale,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    pub grid: Grid,
    /// Present only while the page is active
    pub canvases: Option<Canvases>,
    pub active: bool,
    pub dirty: Dirty,
}

impl Page {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            grid: Grid::new(),
            canvases: None,
            active: true,
            dirty: Dirty::Full,
        }
    }

    pub fn mark_rows(&mut self, rows: RangeInclusive<Mu>) {
        self.dirty.add_rows(rows);
    }

    pub fn mark_full(&mut self) {
        self.dirty = Dirty::Full;
    }

    /// Activate or deactivate. Returns true if the state changed.
    ///
    /// Deactivation releases the canvases; reactivation forces a full repaint.
    pub fn set_active(&mut self, active: bool) -> bool {
        if self.active == active {
            return false;
        }
        self.active = active;
        if active {
            self.mark_full();
        } else {
            self.canvases = None;
        }
        true
    }
}
