//! Font size resolution for a fixed character pitch
//!
//! Finds the font size at which the widest probe glyph covers exactly
//! `pitch × inkWidthPct / 100`, and never more, so monospaced glyphs tile the
//! cell grid without overflowing it.

use crate::coordinates::snap_to_device;
use crate::font::FontFace;

/// Glyphs whose maximum advance defines the face's ink width
pub const PROBE: &str = "MW@#%&0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

pub const DEFAULT_INK_WIDTH_PCT: f32 = 84.0;
pub const MAX_INK_WIDTH_PCT: f32 = 150.0;

/// Acceptable relative error of the relaxation
pub const TOLERANCE: f32 = 0.002;

const REFERENCE_SIZE_PX: f32 = 100.0;
const MAX_RELAX_STEPS: usize = 8;
const MAX_DECREMENT_STEPS: usize = 400;
const MIN_SIZE_PX: f32 = 1.0;

/// Font size and vertical extent for the current pitch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedMetrics {
    pub font_size_px: f32,
    pub ascent_px: f32,
    pub descent_px: f32,
}

impl ResolvedMetrics {
    /// Estimate used when nothing has ever been measured
    fn estimate(target_px: f32) -> Self {
        let font_size_px = (target_px / 0.6).max(MIN_SIZE_PX);
        Self {
            font_size_px,
            ascent_px: font_size_px * 0.8,
            descent_px: font_size_px * 0.2,
        }
    }
}

/// Cell geometry derived from resolved metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub font: ResolvedMetrics,
    /// Pitch snapped to whole device pixels
    pub cell_width: f32,
    /// Nominal line height, snapped to whole device pixels
    pub line_height: f32,
}

impl CellMetrics {
    /// Height of one mu in CSS pixels
    pub fn mu_px(&self) -> f32 {
        self.line_height / crate::coordinates::GRID_DIV as f32
    }
}

/// Widest advance over the probe string
pub fn max_probe_advance(face: &dyn FontFace, size_px: f32) -> Option<f32> {
    let mut widest: Option<f32> = None;
    for ch in PROBE.chars() {
        if let Some(advance) = face.advance(ch, size_px) {
            if advance.is_finite() {
                widest = Some(widest.map_or(advance, |w| w.max(advance)));
            }
        }
    }
    widest.filter(|w| *w > 0.0)
}

/// Remembers the last stable resolution so a face that cannot be measured
/// degrades to it instead of failing.
#[derive(Debug, Clone, Default)]
pub struct MetricsResolver {
    last_stable: Option<ResolvedMetrics>,
}

impl MetricsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_stable(&self) -> Option<ResolvedMetrics> {
        self.last_stable
    }

    pub fn resolve(&mut self, face: &dyn FontFace, pitch_px: f32, ink_width_pct: f32) -> ResolvedMetrics {
        let pct = if ink_width_pct.is_finite() {
            ink_width_pct.clamp(0.0, MAX_INK_WIDTH_PCT)
        } else {
            DEFAULT_INK_WIDTH_PCT
        };
        let target = pitch_px * pct / 100.0;
        if !(target.is_finite() && target > 0.0) {
            return self.fallback(target);
        }

        let Some(reference) = max_probe_advance(face, REFERENCE_SIZE_PX) else {
            tracing::warn!("Face '{}' has no usable metrics, keeping last stable size", face.name());
            return self.fallback(target);
        };

        let mut size = REFERENCE_SIZE_PX * target / reference;
        for _ in 0..MAX_RELAX_STEPS {
            let Some(width) = max_probe_advance(face, size) else {
                return self.fallback(target);
            };
            if ((width - target) / target).abs() <= TOLERANCE {
                break;
            }
            size *= target / width;
        }

        if !(size.is_finite() && size > 0.0) {
            return self.fallback(target);
        }

        // Never let the ink overflow the cell, however small the target
        for _ in 0..MAX_DECREMENT_STEPS {
            match max_probe_advance(face, size) {
                Some(width) if width > target => {
                    let step = size * TOLERANCE / 4.0;
                    size = (size * target / width).min(size - step);
                }
                _ => break,
            }
        }

        let Some(line) = face.line_metrics(size) else {
            return self.fallback(target);
        };
        let resolved = ResolvedMetrics {
            font_size_px: size,
            ascent_px: line.ascent,
            descent_px: line.descent,
        };
        self.last_stable = Some(resolved);
        resolved
    }

    fn fallback(&self, target: f32) -> ResolvedMetrics {
        self.last_stable.unwrap_or_else(|| {
            let target = if target.is_finite() && target > 0.0 { target } else { 8.0 };
            ResolvedMetrics::estimate(target)
        })
    }
}

/// Snap the pitch and line height to the device pixel grid
pub fn cell_metrics(font: ResolvedMetrics, pitch_px: f32, device_pixel_ratio: f32) -> CellMetrics {
    CellMetrics {
        font,
        cell_width: snap_to_device(pitch_px, device_pixel_ratio),
        line_height: snap_to_device(font.ascent_px + font.descent_px, device_pixel_ratio),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::{FallbackFace, GlyphBitmap, LineMetrics};

    /// Face whose advance grows slightly faster than linearly, like hinted fonts
    struct HintedFace;

    impl FontFace for HintedFace {
        fn name(&self) -> &str {
            "hinted"
        }
        fn advance(&self, ch: char, size_px: f32) -> Option<f32> {
            let base = if ch == 'W' { 0.62 } else { 0.55 };
            Some(base * size_px + (size_px * 0.37).round() * 0.01)
        }
        fn line_metrics(&self, size_px: f32) -> Option<LineMetrics> {
            Some(LineMetrics {
                ascent: size_px * 0.75,
                descent: size_px * 0.25,
            })
        }
        fn rasterize(&self, _ch: char, _size_px: f32) -> Option<GlyphBitmap> {
            None
        }
    }

    struct BlankFace;

    impl FontFace for BlankFace {
        fn name(&self) -> &str {
            "blank"
        }
        fn advance(&self, _ch: char, _size_px: f32) -> Option<f32> {
            None
        }
        fn line_metrics(&self, _size_px: f32) -> Option<LineMetrics> {
            None
        }
        fn rasterize(&self, _ch: char, _size_px: f32) -> Option<GlyphBitmap> {
            None
        }
    }

    #[test]
    fn test_resolves_linear_face_exactly() {
        let mut resolver = MetricsResolver::new();
        let resolved = resolver.resolve(&FallbackFace, 10.0, 84.0);
        let width = max_probe_advance(&FallbackFace, resolved.font_size_px).unwrap();
        assert!(width <= 8.4 + 1e-4);
        assert!((width - 8.4).abs() / 8.4 <= TOLERANCE);
        assert!((resolved.ascent_px - resolved.font_size_px * 0.8).abs() < 1e-4);
    }

    #[test]
    fn test_never_overflows_target() {
        let mut resolver = MetricsResolver::new();
        for pitch in [6.0f32, 9.6, 12.0, 16.0, 24.0] {
            for pct in [50.0f32, 84.0, 100.0, 150.0] {
                let resolved = resolver.resolve(&HintedFace, pitch, pct);
                let target = pitch * pct / 100.0;
                let width = max_probe_advance(&HintedFace, resolved.font_size_px).unwrap();
                assert!(width <= target * (1.0 + 1e-5), "pitch {pitch} pct {pct}: {width} > {target}");
            }
        }
    }

    #[test]
    fn test_small_ink_width_still_fits() {
        let mut resolver = MetricsResolver::new();
        for pct in [1.0f32, 5.0, 10.0] {
            let resolved = resolver.resolve(&FallbackFace, 9.6, pct);
            let target = 9.6 * pct / 100.0;
            let width = max_probe_advance(&FallbackFace, resolved.font_size_px).unwrap();
            assert!(resolved.font_size_px > 0.0);
            assert!(width <= target * (1.0 + 1e-5), "pct {pct}: {width} > {target}");

            let resolved = resolver.resolve(&HintedFace, 6.0, pct);
            let target = 6.0 * pct / 100.0;
            let width = max_probe_advance(&HintedFace, resolved.font_size_px).unwrap();
            assert!(width <= target * (1.0 + 1e-5), "hinted pct {pct}: {width} > {target}");
        }
    }

    #[test]
    fn test_unmeasurable_face_falls_back_to_last_stable() {
        let mut resolver = MetricsResolver::new();
        let stable = resolver.resolve(&FallbackFace, 10.0, 84.0);
        assert_eq!(resolver.resolve(&BlankFace, 12.0, 84.0), stable);

        let mut fresh = MetricsResolver::new();
        let estimate = fresh.resolve(&BlankFace, 12.0, 84.0);
        assert!(estimate.font_size_px > 0.0);
        assert!(fresh.last_stable().is_none());
    }

    #[test]
    fn test_cell_metrics_snap_to_device_pixels() {
        let font = ResolvedMetrics {
            font_size_px: 13.4,
            ascent_px: 10.7,
            descent_px: 2.9,
        };
        let cells = cell_metrics(font, 9.5997, 2.0);
        assert_eq!(cells.cell_width, 9.5);
        assert_eq!(cells.line_height, 13.5);
        assert_eq!(cells.mu_px(), 13.5 / 8.0);
    }
}
