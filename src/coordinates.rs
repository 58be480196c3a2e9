//! Coordinate system transformation hub
//!
//! Three distinct coordinate spaces with explicit transformations:
//! 1. Grid space: page index, row in mu, column (what the grid stores)
//! 2. Page space: CSS pixels from the page's top-left corner (margins, layout)
//! 3. Physical space: device pixels at the current render scale (what gets painted)

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Sub-line units per nominal typed line
pub const GRID_DIV: i32 = 8;

/// CSS pixels per inch
pub const CSS_DPI: f32 = 96.0;

/// Millimetres per inch
pub const MM_PER_INCH: f32 = 25.4;

// === Grid Space ===

/// Row coordinate in sub-line units (1/8 of a nominal line)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mu(pub i32);

impl Mu {
    /// Row offset for a number of whole nominal lines
    pub const fn lines(n: i32) -> Self {
        Mu(n * GRID_DIV)
    }

    /// Baseline y in page space for this row
    pub fn to_px(self, mu_px: f32) -> f32 {
        self.0 as f32 * mu_px
    }

    /// Smallest row whose baseline is at or below `px`
    pub fn ceil_from_px(px: f32, mu_px: f32) -> Self {
        if mu_px <= 0.0 {
            return Mu(0);
        }
        Mu((px / mu_px - 1e-4).ceil() as i32)
    }

    /// Largest row whose baseline is at or above `px`
    pub fn floor_from_px(px: f32, mu_px: f32) -> Self {
        if mu_px <= 0.0 {
            return Mu(0);
        }
        Mu((px / mu_px + 1e-4).floor() as i32)
    }
}

impl Add for Mu {
    type Output = Mu;
    fn add(self, rhs: Mu) -> Mu {
        Mu(self.0 + rhs.0)
    }
}

impl Sub for Mu {
    type Output = Mu;
    fn sub(self, rhs: Mu) -> Mu {
        Mu(self.0 - rhs.0)
    }
}

/// A cell address inside the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    pub page: usize,
    pub row: Mu,
    pub col: i32,
}

impl GridPos {
    pub const fn new(page: usize, row: Mu, col: i32) -> Self {
        Self { page, row, col }
    }
}

// === Page Space ===

/// Position in page space (CSS pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PagePos {
    pub x: f32,
    pub y: f32,
}

/// Physical sheet dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl PageGeometry {
    /// ISO A4 portrait
    pub const A4: PageGeometry = PageGeometry {
        width_mm: 210.0,
        height_mm: 297.0,
    };

    /// Sheet width in inches, rounded to four places
    pub fn width_in(&self) -> f32 {
        round_to(self.width_mm / MM_PER_INCH, 4)
    }

    pub fn width_px(&self) -> f32 {
        self.width_in() * CSS_DPI
    }

    pub fn height_px(&self) -> f32 {
        round_to(self.height_mm / MM_PER_INCH, 4) * CSS_DPI
    }

    /// Fractional number of character columns across the sheet
    pub fn cols_across(&self, cpi: f32) -> f32 {
        round_to(self.width_in() * cpi, 2)
    }

    /// Character pitch in CSS pixels for the given characters-per-inch
    pub fn pitch_px(&self, cpi: f32) -> f32 {
        let cols = self.cols_across(cpi);
        if cols <= 0.0 {
            return 0.0;
        }
        self.width_px() / cols
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::A4
    }
}

// === Physical Space ===

/// Rectangle in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: (right - left).max(0),
            height: (bottom - top).max(0),
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn intersect(&self, other: &PixelRect) -> PixelRect {
        PixelRect::from_edges(
            self.x.max(other.x),
            self.y.max(other.y),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        )
    }

    pub fn intersects(&self, other: &PixelRect) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Vertical band `[top, bottom)` spanning the full width of `self`
    pub fn band(&self, top: i32, bottom: i32) -> PixelRect {
        self.intersect(&PixelRect::from_edges(self.x, top, self.right(), bottom))
    }
}

/// Snap a CSS length to the nearest whole number of device pixels
pub fn snap_to_device(px: f32, device_pixel_ratio: f32) -> f32 {
    if device_pixel_ratio <= 0.0 {
        return px;
    }
    (px * device_pixel_ratio).round().max(1.0) / device_pixel_ratio
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f32, places: i32) -> f32 {
    let scale = 10f32.powi(places);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cols_across_at_ten_cpi() {
        let page = PageGeometry::A4;
        assert_eq!(page.width_in(), 8.2677);
        assert!((page.cols_across(10.0) - 82.68).abs() < 1e-4);
        assert!((page.pitch_px(10.0) - 9.5997).abs() < 1e-3);
    }

    #[test]
    fn test_mu_conversions() {
        let mu_px = 2.0;
        assert_eq!(Mu(12).to_px(mu_px), 24.0);
        assert_eq!(Mu::ceil_from_px(24.0, mu_px), Mu(12));
        assert_eq!(Mu::ceil_from_px(24.5, mu_px), Mu(13));
        assert_eq!(Mu::floor_from_px(25.9, mu_px), Mu(12));
        assert_eq!(Mu::lines(3), Mu(24));
        assert_eq!(Mu::ceil_from_px(10.0, 0.0), Mu(0));
    }

    #[test]
    fn test_snap_to_device() {
        assert_eq!(snap_to_device(9.5997, 1.0), 10.0);
        assert_eq!(snap_to_device(9.5997, 2.0), 9.5);
        assert_eq!(snap_to_device(0.1, 1.0), 1.0);
    }

    #[test]
    fn test_rect_intersection() {
        let a = PixelRect::new(0, 0, 100, 100);
        let b = PixelRect::new(50, 80, 100, 100);
        assert_eq!(a.intersect(&b), PixelRect::new(50, 80, 50, 20));
        assert!(!a.intersects(&PixelRect::new(100, 0, 10, 10)));
        assert_eq!(a.band(90, 200), PixelRect::new(0, 90, 100, 10));
    }
}
