//! Double-buffered, dirty-region page painter
//!
//! Mutations only mark rows dirty and ask for a paint; the `RenderSession`
//! collects those requests into at most one paint per page per frame (or per
//! outermost batch). Painting draws into the back buffer, composites grain and
//! then blits the touched rectangle into the visible buffer.

use crate::atlas::{wear_variant, AtlasCache, AtlasParams};
use crate::bounds::PageLayout;
use crate::config::RenderConfig;
use crate::coordinates::{Mu, PixelRect};
use crate::font::FontFace;
use crate::grain::{grain_intensity, GrainCache};
use crate::grid::{Glyph, Ink, RowMap};
use crate::page::{Canvases, Dirty, Page};
use crate::raster::{Surface, PAPER_WHITE};
use std::collections::BTreeSet;

/// Falloff applied per layer of overtype above a strike
const LAYER_FALLOFF: f32 = 0.92;
const MIN_LAYER_ALPHA: f32 = 0.1;

/// Opacity multiplier for the strike at `index` of a stack of `len`
pub fn layer_alpha(ink: Ink, index: usize, len: usize) -> f32 {
    let above = len.saturating_sub(index + 1);
    if ink == Ink::White || above == 0 {
        return 1.0;
    }
    (LAYER_FALLOFF * LAYER_FALLOFF.powi(above as i32)).clamp(MIN_LAYER_ALPHA, 1.0)
}

/// Largest render scale whose canvas still fits the hardware limit
pub fn clamp_render_scale(desired: f32, page_width: f32, page_height: f32, max_canvas_px: u32) -> f32 {
    let longest = page_width.max(page_height);
    if !(desired.is_finite() && desired > 0.0) || longest <= 0.0 {
        return 1.0;
    }
    let cap = max_canvas_px as f32 / longest;
    if desired > cap {
        tracing::debug!("Render scale {:.3} clamped to {:.3} by canvas cap", desired, cap);
        cap
    } else {
        desired
    }
}

/// Per-document look
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintStyle {
    /// Base opacity per ink, indexed by `Ink::index`, in `[0, 1]`
    pub ink_opacity: [f32; 3],
    pub grain_pct: f32,
    pub grain_seed: u32,
    pub wear_seed: u32,
}

/// Everything a paint pass reads
pub struct PaintContext<'a> {
    pub face: &'a dyn FontFace,
    pub layout: &'a PageLayout,
    pub atlas: &'a AtlasParams,
    pub style: &'a PaintStyle,
}

impl PaintContext<'_> {
    fn scale(&self) -> f32 {
        self.atlas.render_scale
    }

    fn canvas_size(&self) -> (u32, u32) {
        let scale = self.scale();
        (
            (self.layout.page_width * scale).ceil().max(1.0) as u32,
            (self.layout.page_height * scale).ceil().max(1.0) as u32,
        )
    }
}

/// What the last paint of a page did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintKind {
    Full,
    Band(PixelRect),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaintStats {
    pub full: u64,
    pub band: u64,
}

/// Render-side state: atlas and grain caches plus paint scheduling
pub struct RenderSession {
    atlas: AtlasCache,
    grain: GrainCache,
    batch_depth: u32,
    /// Pages with a paint pending for the next frame
    scheduled: BTreeSet<usize>,
    /// Requests made inside a batch, released when the outermost batch ends
    deferred: BTreeSet<usize>,
    stats: PaintStats,
}

impl RenderSession {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            atlas: AtlasCache::new(config.atlas_columns, config.atlas_gutter_px),
            grain: GrainCache::new(),
            batch_depth: 0,
            scheduled: BTreeSet::new(),
            deferred: BTreeSet::new(),
            stats: PaintStats::default(),
        }
    }

    pub fn atlas(&self) -> &AtlasCache {
        &self.atlas
    }

    pub fn grain(&self) -> &GrainCache {
        &self.grain
    }

    pub fn stats(&self) -> PaintStats {
        self.stats
    }

    pub fn invalidate_atlas(&mut self) {
        self.atlas.invalidate();
    }

    /// Drop every page's grain mask
    pub fn clear_grain(&mut self) {
        self.grain.clear();
    }

    // === Batching ===

    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Close a batch. Returns true when this closed the outermost one.
    pub fn end_batch(&mut self) -> bool {
        if self.batch_depth == 0 {
            return false;
        }
        self.batch_depth -= 1;
        if self.batch_depth > 0 {
            return false;
        }
        self.scheduled.append(&mut self.deferred);
        true
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    /// Ask for `page` to be painted on the next frame
    pub fn request_paint(&mut self, page: usize) {
        if self.in_batch() {
            self.deferred.insert(page);
        } else {
            self.scheduled.insert(page);
        }
    }

    pub fn is_scheduled(&self, page: usize) -> bool {
        self.scheduled.contains(&page)
    }

    pub fn has_scheduled(&self) -> bool {
        !self.scheduled.is_empty()
    }

    pub fn take_scheduled(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.scheduled).into_iter().collect()
    }

    // === Painting ===

    /// Paint whatever is dirty on `page`. Inactive pages are left dirty.
    pub fn paint_page(&mut self, page: &mut Page, ctx: &PaintContext) -> Option<PaintKind> {
        if !page.active {
            return None;
        }
        let (width, height) = ctx.canvas_size();
        let stale = page.canvases.as_ref().map_or(true, |c| {
            c.back.width() != width || c.back.height() != height || c.scale != ctx.scale()
        });
        if stale {
            page.canvases = Some(Canvases::new(width, height, ctx.scale()));
            page.mark_full();
        }

        let kind = match page.dirty {
            Dirty::Clean => return None,
            Dirty::Full => {
                self.full_repaint(page, ctx);
                self.stats.full += 1;
                PaintKind::Full
            }
            Dirty::Rows { min, max } => {
                let rect = self.band_repaint(page, ctx, min, max);
                self.stats.band += 1;
                PaintKind::Band(rect)
            }
        };
        page.dirty = Dirty::Clean;
        Some(kind)
    }

    fn full_repaint(&mut self, page: &mut Page, ctx: &PaintContext) {
        let Some(canvases) = page.canvases.as_mut() else {
            return;
        };
        let rect = canvases.back.bounds();
        canvases.back.clear_rect(rect);
        for (row, cells) in page.grid.rows() {
            draw_row(&mut self.atlas, &mut canvases.back, ctx, page.index, row, cells, rect);
        }
        self.composite(page.index, &mut canvases.back, ctx, rect);
        canvases.visible.blit_from(&canvases.back, rect);
    }

    fn band_repaint(&mut self, page: &mut Page, ctx: &PaintContext, min: Mu, max: Mu) -> PixelRect {
        let scale = ctx.scale();
        let font = ctx.layout.cells.font;
        let bleed = font.ascent_px + font.descent_px;
        let mu_px = ctx.layout.mu_px();

        let band_top = ctx.layout.row_y(min) - font.ascent_px - bleed;
        let band_bottom = ctx.layout.row_y(max) + font.descent_px + bleed;

        let Some(canvases) = page.canvases.as_mut() else {
            return PixelRect::default();
        };
        let rect = canvases
            .back
            .bounds()
            .band((band_top * scale).floor() as i32, (band_bottom * scale).ceil() as i32);
        if rect.is_empty() {
            return rect;
        }

        // Rows whose own bleed-expanded extent reaches into the band
        let first = Mu::floor_from_px(band_top - font.descent_px - bleed, mu_px);
        let last = Mu::ceil_from_px(band_bottom + font.ascent_px + bleed, mu_px);

        canvases.back.clear_rect(rect);
        for (row, cells) in page.grid.rows_in(first..=last) {
            draw_row(&mut self.atlas, &mut canvases.back, ctx, page.index, row, cells, rect);
        }
        self.composite(page.index, &mut canvases.back, ctx, rect);
        canvases.visible.blit_from(&canvases.back, rect);
        rect
    }

    /// Erase ink through the grain, then back everything with paper
    fn composite(&mut self, page: usize, back: &mut Surface, ctx: &PaintContext, rect: PixelRect) {
        let intensity = grain_intensity(ctx.style.grain_pct);
        if intensity > 0.0 {
            let grain = self.grain.get(
                page,
                back.width(),
                back.height(),
                ctx.layout.cells.cell_width * ctx.scale(),
                ctx.style.grain_seed,
            );
            back.subtract_alpha(&grain.mask, intensity, 1.0, rect);
        }
        back.fill_beneath(rect, PAPER_WHITE);
    }
}

fn draw_row(
    atlas: &mut AtlasCache,
    back: &mut Surface,
    ctx: &PaintContext,
    page: usize,
    row: Mu,
    cells: &RowMap,
    clip: PixelRect,
) {
    let scale = ctx.scale();
    let baseline = (ctx.layout.row_y(row) * scale).round() as i32;
    for (&col, stack) in cells {
        let x = (ctx.layout.col_x(col) * scale).round() as i32;
        let variant = wear_variant(page, row, col, ctx.style.wear_seed);
        draw_stack(atlas, back, ctx, stack, variant, x, baseline, clip);
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_stack(
    atlas: &mut AtlasCache,
    back: &mut Surface,
    ctx: &PaintContext,
    stack: &[Glyph],
    variant: u8,
    x: i32,
    baseline: i32,
    clip: PixelRect,
) {
    for (i, glyph) in stack.iter().enumerate() {
        let base = ctx.style.ink_opacity[glyph.ink.index()];
        let alpha = base * layer_alpha(glyph.ink, i, stack.len());
        let sheet = atlas.sheet(ctx.face, ctx.atlas, glyph.ink, variant);
        let Some(src) = sheet.slot(glyph.ch) else {
            continue;
        };
        let dst_x = x - sheet.gutter() as i32;
        let dst_y = baseline - sheet.baseline();
        back.draw_mask(sheet.mask(), src, dst_x, dst_y, glyph.ink.rgb(), alpha, clip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_alpha_falloff() {
        assert_eq!(layer_alpha(Ink::Black, 0, 1), 1.0);
        assert_eq!(layer_alpha(Ink::Black, 2, 3), 1.0);
        assert!((layer_alpha(Ink::Black, 1, 3) - 0.92 * 0.92).abs() < 1e-6);
        assert!((layer_alpha(Ink::Red, 0, 3) - 0.92 * 0.92 * 0.92).abs() < 1e-6);
        assert_eq!(layer_alpha(Ink::Black, 0, 60), MIN_LAYER_ALPHA);
        assert_eq!(layer_alpha(Ink::White, 0, 5), 1.0);
    }

    #[test]
    fn test_render_scale_clamp() {
        assert_eq!(clamp_render_scale(2.0, 800.0, 1000.0, 8192), 2.0);
        assert!((clamp_render_scale(16.0, 800.0, 1000.0, 8192) - 8.192).abs() < 1e-4);
        assert_eq!(clamp_render_scale(f32::NAN, 800.0, 1000.0, 8192), 1.0);
    }

    #[test]
    fn test_nested_batches_release_once() {
        let mut session = RenderSession::new(&RenderConfig::default());
        session.begin_batch();
        session.begin_batch();
        session.request_paint(2);
        session.request_paint(2);
        assert!(!session.end_batch());
        assert!(!session.is_scheduled(2));
        assert!(session.end_batch());
        assert_eq!(session.take_scheduled(), vec![2]);
        assert!(!session.end_batch());
    }
}
