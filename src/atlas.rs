//! Glyph atlas cache - one sprite sheet per (ink, wear variant)
//!
//! Each sheet holds the printable ASCII range rasterized once at the current
//! render scale, packed into a fixed-column grid of equal slots with a clear
//! gutter so neighbouring glyphs never bleed into each other when sampled.

use crate::coordinates::{Mu, PixelRect};
use crate::font::FontFace;
use crate::grain::mix32;
use crate::grid::Ink;
use crate::raster::AlphaMask;
use ahash::AHashMap;

pub const FIRST_GLYPH: char = ' ';
pub const LAST_GLYPH: char = '~';
const GLYPH_COUNT: u32 = LAST_GLYPH as u32 - FIRST_GLYPH as u32 + 1;

/// Number of wear variants; variant 0 is the clean strike
pub const WEAR_VARIANTS: u8 = 3;

/// Everything a sheet's pixels depend on. A change clears the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasParams {
    pub face: String,
    /// Bumped whenever a new face object replaces the old one
    pub face_generation: u64,
    pub font_size_px: f32,
    pub cell_width: f32,
    pub ascent_px: f32,
    pub descent_px: f32,
    /// Device pixel ratio times zoom
    pub render_scale: f32,
}

/// Wear variant of a cell, stable across repaints
pub fn wear_variant(page: usize, row: Mu, col: i32, seed: u32) -> u8 {
    let mut h = mix32(seed ^ 0x9e37_79b9);
    h = mix32(h ^ page as u32);
    h = mix32(h ^ row.0 as u32);
    h = mix32(h ^ col as u32);
    match h % 100 {
        0..=77 => 0,
        78..=93 => 1,
        _ => 2,
    }
}

/// Rasterized printable ASCII for one ink and wear variant
#[derive(Debug, Clone)]
pub struct AtlasSheet {
    pub ink: Ink,
    pub variant: u8,
    mask: AlphaMask,
    columns: u32,
    slot_width: u32,
    slot_height: u32,
    gutter: u32,
    /// Baseline offset from the top of a slot
    baseline: i32,
}

impl AtlasSheet {
    fn build(face: &dyn FontFace, params: &AtlasParams, ink: Ink, variant: u8, columns: u32, gutter: u32) -> Self {
        let scale = params.render_scale;
        let columns = columns.max(1);
        let slot_width = (params.cell_width * scale).ceil() as u32 + gutter * 2;
        let slot_height = ((params.ascent_px + params.descent_px) * scale).ceil() as u32 + gutter * 2;
        let rows = GLYPH_COUNT.div_ceil(columns);
        let baseline = gutter as i32 + (params.ascent_px * scale).round() as i32;
        let mut mask = AlphaMask::new(columns * slot_width, rows * slot_height);

        let size = params.font_size_px * scale;
        let cell = params.cell_width * scale;
        for (i, ch) in (FIRST_GLYPH..=LAST_GLYPH).enumerate() {
            let Some(glyph) = face.rasterize(ch, size) else {
                continue;
            };
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let sx = (i as u32 % columns * slot_width) as i32;
            let sy = (i as u32 / columns * slot_height) as i32;
            let pen_x = gutter as i32 + ((cell - glyph.advance) / 2.0).round() as i32;
            let gx = sx + pen_x + glyph.xmin;
            let gy = sy + baseline - (glyph.ymin + glyph.height as i32);
            // Keep the outermost gutter pixel clear
            let clip = PixelRect::new(sx + 1, sy + 1, slot_width as i32 - 2, slot_height as i32 - 2);
            for strike in 0..=variant as i32 {
                mask.stamp(&glyph.coverage, glyph.width, gx - strike, gy - strike / 2, clip);
            }
        }

        Self {
            ink,
            variant,
            mask,
            columns,
            slot_width,
            slot_height,
            gutter,
            baseline,
        }
    }

    pub fn mask(&self) -> &AlphaMask {
        &self.mask
    }

    pub fn gutter(&self) -> u32 {
        self.gutter
    }

    pub fn baseline(&self) -> i32 {
        self.baseline
    }

    pub fn slot_size(&self) -> (u32, u32) {
        (self.slot_width, self.slot_height)
    }

    /// Source rectangle of a character, or `None` outside printable ASCII
    pub fn slot(&self, ch: char) -> Option<PixelRect> {
        if !(FIRST_GLYPH..=LAST_GLYPH).contains(&ch) {
            return None;
        }
        let i = ch as u32 - FIRST_GLYPH as u32;
        Some(PixelRect::new(
            (i % self.columns * self.slot_width) as i32,
            (i / self.columns * self.slot_height) as i32,
            self.slot_width as i32,
            self.slot_height as i32,
        ))
    }
}

/// Sheets keyed by (ink, variant); cleared wholesale when parameters change
pub struct AtlasCache {
    params: Option<AtlasParams>,
    sheets: AHashMap<(Ink, u8), AtlasSheet>,
    columns: u32,
    gutter: u32,
}

impl AtlasCache {
    pub fn new(columns: u32, gutter: u32) -> Self {
        Self {
            params: None,
            sheets: AHashMap::new(),
            columns,
            gutter,
        }
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn invalidate(&mut self) {
        if !self.sheets.is_empty() {
            tracing::debug!("Invalidating glyph atlas ({} sheets)", self.sheets.len());
        }
        self.sheets.clear();
        self.params = None;
    }

    /// Adopt `params`, clearing every sheet if they differ. Returns true on clear.
    pub fn ensure(&mut self, params: &AtlasParams) -> bool {
        if self.params.as_ref() == Some(params) {
            return false;
        }
        self.invalidate();
        self.params = Some(params.clone());
        true
    }

    pub fn sheet(&mut self, face: &dyn FontFace, params: &AtlasParams, ink: Ink, variant: u8) -> &AtlasSheet {
        self.ensure(params);
        let variant = variant.min(WEAR_VARIANTS - 1);
        let (columns, gutter) = (self.columns, self.gutter);
        self.sheets
            .entry((ink, variant))
            .or_insert_with(|| AtlasSheet::build(face, params, ink, variant, columns, gutter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FallbackFace;

    fn params(scale: f32) -> AtlasParams {
        AtlasParams {
            face: FallbackFace::NAME.to_string(),
            face_generation: 1,
            font_size_px: 14.0,
            cell_width: 10.0,
            ascent_px: 11.2,
            descent_px: 2.8,
            render_scale: scale,
        }
    }

    #[test]
    fn test_sheet_layout() {
        let mut cache = AtlasCache::new(16, 2);
        let sheet = cache.sheet(&FallbackFace, &params(1.0), Ink::Black, 0);
        assert_eq!(sheet.slot_size(), (14, 18));
        assert_eq!(sheet.mask().width(), 16 * 14);
        assert_eq!(sheet.mask().height(), 6 * 18);
        assert_eq!(sheet.slot(' '), Some(PixelRect::new(0, 0, 14, 18)));
        assert_eq!(sheet.slot('0'), Some(PixelRect::new(0, 18, 14, 18)));
        assert_eq!(sheet.slot('\u{e9}'), None);
    }

    #[test]
    fn test_gutter_stays_clear() {
        let mut cache = AtlasCache::new(16, 2);
        let sheet = cache.sheet(&FallbackFace, &params(2.0), Ink::Red, 2);
        let mask = sheet.mask();
        let (w, h) = sheet.slot_size();
        for x in 0..mask.width() as i32 {
            for slot_row in 0..6 {
                assert_eq!(mask.get(x, slot_row * h as i32), 0);
            }
        }
        for y in 0..mask.height() as i32 {
            for slot_col in 0..16 {
                assert_eq!(mask.get(slot_col * w as i32, y), 0);
            }
        }
        let a = sheet.slot('A').unwrap();
        let inked = (a.y..a.bottom()).any(|y| (a.x..a.right()).any(|x| mask.get(x, y) > 0));
        assert!(inked);
    }

    #[test]
    fn test_variants_differ_from_clean() {
        let mut cache = AtlasCache::new(16, 2);
        let clean = cache.sheet(&FallbackFace, &params(1.0), Ink::Black, 0).mask().clone();
        let worn = cache.sheet(&FallbackFace, &params(1.0), Ink::Black, 2).mask().clone();
        assert_ne!(clean, worn);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_param_change_invalidates() {
        let mut cache = AtlasCache::new(16, 2);
        cache.sheet(&FallbackFace, &params(1.0), Ink::Black, 0);
        cache.sheet(&FallbackFace, &params(1.0), Ink::White, 1);
        assert_eq!(cache.len(), 2);
        assert!(!cache.ensure(&params(1.0)));
        assert!(cache.ensure(&params(1.5)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_wear_variant_is_deterministic() {
        let a = wear_variant(0, Mu(64), 12, 42);
        assert_eq!(a, wear_variant(0, Mu(64), 12, 42));
        let variants: Vec<u8> = (0..400).map(|c| wear_variant(1, Mu(8), c, 7)).collect();
        assert!(variants.iter().all(|v| *v < WEAR_VARIANTS));
        assert!(variants.iter().any(|v| *v == 0));
        assert!(variants.iter().any(|v| *v > 0));
    }
}
