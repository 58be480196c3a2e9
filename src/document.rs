//! The typed document: pages, caret and settings, plus the render session
//! that paints them.
//!
//! Every mutation runs to completion synchronously and only marks pages dirty;
//! `render_frame` is the one place pixels are produced.

use crate::atlas::AtlasParams;
use crate::bounds::{is_allowed_line_height, line_step, Bounds, Margins, PageLayout};
use crate::config::TypewriterConfig;
use crate::coordinates::{GridPos, PageGeometry};
use crate::error::PersistError;
use crate::export;
use crate::font::{FallbackFace, FontFace, FontLoader, FontSource};
use crate::grid::{Glyph, Ink, Touched};
use crate::metrics::{cell_metrics, MetricsResolver, DEFAULT_INK_WIDTH_PCT, MAX_INK_WIDTH_PCT};
use crate::page::Page;
use crate::painter::{clamp_render_scale, PaintContext, PaintKind, PaintStyle, RenderSession};
use crate::persist::{dump_grid, DocumentRecord, InkOpacity, PersistScheduler, PersistenceHost, CURRENT_VERSION, STORAGE_KEY};
use crate::raster::Surface;
use crate::reflow::{self, Carriage};
use crate::typing::{expand_tabs, paste_lines, TypingState};
use crate::virtualize::{active_window, apply_window, page_frames, Viewport};
use std::ops::RangeInclusive;
use std::sync::Arc;

pub const CPI_RANGE: RangeInclusive<f32> = 4.0..=20.0;
pub const ZOOM_RANGE: RangeInclusive<f32> = 0.25..=4.0;
pub const GRAIN_RANGE: RangeInclusive<f32> = 0.0..=100.0;
pub const OPACITY_RANGE: RangeInclusive<f32> = 0.0..=100.0;

/// Per-document settings; these travel with the persisted record
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Requested face name; the face actually in use may be a fallback
    pub font: String,
    pub margins: Margins,
    pub ink: Ink,
    pub show_ruler: bool,
    pub show_margin_box: bool,
    pub cpi: f32,
    pub ink_width_pct: f32,
    /// Base opacity per ink, 0-100, indexed by `Ink::index`
    pub ink_opacity: [f32; 3],
    pub line_height: f32,
    pub zoom: f32,
    pub grain_pct: f32,
    pub grain_seed: u32,
    pub wear_seed: u32,
    pub word_wrap: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            font: FallbackFace::NAME.to_string(),
            margins: Margins::default(),
            ink: Ink::Black,
            show_ruler: true,
            show_margin_box: false,
            cpi: 10.0,
            ink_width_pct: DEFAULT_INK_WIDTH_PCT,
            ink_opacity: [100.0, 100.0, 100.0],
            line_height: 1.0,
            zoom: 1.0,
            grain_pct: 35.0,
            grain_seed: 0x5eed_0001,
            wear_seed: 0x5eed_0002,
            word_wrap: true,
        }
    }
}

/// Caret movements that do not type anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaretMove {
    Left,
    Right,
    Up,
    Down,
    LineStart,
    LineEnd,
}

pub struct Document {
    config: TypewriterConfig,
    geometry: PageGeometry,
    settings: Settings,
    pages: Vec<Page>,
    caret: GridPos,

    face: Arc<dyn FontFace>,
    face_generation: u64,
    fonts: FontLoader,
    resolver: MetricsResolver,
    layout: PageLayout,
    bounds: Bounds,

    session: RenderSession,
    typing: TypingState,
    viewport: Option<Viewport>,
    frozen: bool,
    /// Unfreeze once the next frame has painted
    thaw_after_frame: bool,
    device_pixel_ratio: f32,
    render_scale: f32,
    /// When the pending crisp redraw after a zoom change falls due
    crisp_redraw_at: Option<u64>,

    persist: PersistScheduler,
    unsaved: bool,
}

fn compute_layout(
    geometry: &PageGeometry,
    settings: &Settings,
    face: &dyn FontFace,
    resolver: &mut MetricsResolver,
    device_pixel_ratio: f32,
) -> (PageLayout, Bounds) {
    let pitch = geometry.pitch_px(settings.cpi);
    let font = resolver.resolve(face, pitch, settings.ink_width_pct);
    let layout = PageLayout {
        page_width: geometry.width_px(),
        page_height: geometry.height_px(),
        cells: cell_metrics(font, pitch, device_pixel_ratio),
        line_step: line_step(settings.line_height),
    };
    let bounds = Bounds::compute(&layout, settings.margins);
    (layout, bounds)
}

impl Document {
    /// Empty document drawn with the built-in face
    pub fn new(config: TypewriterConfig) -> Self {
        Self::with_face(config, Arc::new(FallbackFace))
    }

    pub fn with_face(config: TypewriterConfig, face: Arc<dyn FontFace>) -> Self {
        let settings = Settings {
            font: config
                .fonts
                .candidates
                .first()
                .cloned()
                .unwrap_or_else(|| FallbackFace::NAME.to_string()),
            ..Settings::default()
        };
        Self::with_settings(config, face, settings)
    }

    fn with_settings(config: TypewriterConfig, face: Arc<dyn FontFace>, settings: Settings) -> Self {
        let geometry = PageGeometry::A4;
        let mut resolver = MetricsResolver::new();
        let device_pixel_ratio = 1.0;
        let (layout, bounds) = compute_layout(&geometry, &settings, face.as_ref(), &mut resolver, device_pixel_ratio);
        let render_scale = clamp_render_scale(
            device_pixel_ratio * settings.zoom,
            layout.page_width,
            layout.page_height,
            config.render.max_canvas_px,
        );

        let mut session = RenderSession::new(&config.render);
        session.request_paint(0);

        Self {
            typing: TypingState::new(config.timing.clone()),
            persist: PersistScheduler::new(config.timing.persist_debounce_ms),
            config,
            geometry,
            settings,
            pages: vec![Page::new(0)],
            caret: bounds.origin(0),
            face,
            face_generation: 0,
            fonts: FontLoader::new(),
            resolver,
            layout,
            bounds,
            session,
            viewport: None,
            frozen: false,
            thaw_after_frame: false,
            device_pixel_ratio,
            render_scale,
            crisp_redraw_at: None,
            unsaved: false,
        }
    }

    // === Accessors ===

    pub fn config(&self) -> &TypewriterConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn caret(&self) -> GridPos {
        self.caret
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    pub fn face(&self) -> &Arc<dyn FontFace> {
        &self.face
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    pub fn typing(&self) -> &TypingState {
        &self.typing
    }

    pub fn render_scale(&self) -> f32 {
        self.render_scale
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Visible buffer of an active, painted page
    pub fn page_surface(&self, page: usize) -> Option<&Surface> {
        self.pages
            .get(page)
            .and_then(|p| p.canvases.as_ref())
            .map(|c| &c.visible)
    }

    // === Typing ===

    /// Record touched rows as dirty and ask for their pages to be painted
    fn apply_touched(&mut self, touched: Vec<Touched>) {
        for t in touched {
            if let Some(page) = self.pages.get_mut(t.page) {
                page.mark_rows(t.rows);
                self.session.request_paint(t.page);
            }
        }
        self.unsaved = true;
    }

    /// Run characters through the carriage at the caret
    fn feed(&mut self, text: &str, now_ms: u64) {
        let ink = self.settings.ink;
        let (page_count, caret_page) = (self.pages.len(), self.caret.page);
        let mut carriage = Carriage::new(
            &mut self.pages,
            self.bounds,
            self.layout.line_step,
            self.settings.word_wrap,
            self.caret,
        );
        for ch in text.chars() {
            match ch {
                '\n' => {
                    carriage.newline();
                    self.typing.interrupt();
                }
                ' ' => {
                    carriage.space();
                    self.typing.record_space();
                }
                c if c.is_control() => {}
                c => {
                    let at = carriage.strike(vec![Glyph::new(c, ink)]);
                    if let Some(wrap) = carriage.last_wrap.take() {
                        self.typing.rebase(&wrap);
                    }
                    self.typing.record_typed(at, now_ms);
                }
            }
        }
        self.caret = carriage.pos;
        let touched = std::mem::take(&mut carriage.touched);
        self.apply_touched(touched);
        if self.pages.len() != page_count || self.caret.page != caret_page {
            self.revirtualize();
        }
    }

    pub fn type_char(&mut self, ch: char, now_ms: u64) {
        if ch == '\t' {
            let start = (self.caret.col - self.bounds.left).max(0) as usize;
            let spaces = expand_tabs("\t", start);
            self.feed(&spaces, now_ms);
        } else {
            let mut buf = [0u8; 4];
            self.feed(ch.encode_utf8(&mut buf), now_ms);
        }
    }

    pub fn type_text(&mut self, text: &str, now_ms: u64) {
        let start = (self.caret.col - self.bounds.left).max(0) as usize;
        self.feed(&expand_tabs(text, start), now_ms);
    }

    pub fn newline(&mut self) {
        self.feed("\n", 0);
    }

    /// Insert pasted text as one batch.
    ///
    /// A paste right on the heels of typing replaces the word just typed;
    /// after a backspace burst it inserts at the caret instead.
    pub fn paste(&mut self, text: &str, now_ms: u64) {
        let start = (self.caret.col - self.bounds.left).max(0) as usize;
        let text = expand_tabs(text, start);
        let lines = paste_lines(&text);
        tracing::debug!("Pasting {} chars over {} lines", text.len(), lines.len());

        self.session.begin_batch();
        let was_frozen = self.frozen;
        self.freeze(true);

        if let Some(run) = self.typing.paste_replacement(self.caret, now_ms) {
            if let Some(page) = self.pages.get_mut(run.page) {
                let erased = page.grid.erase(run.row, run.start_col, run.len);
                tracing::debug!("Paste replaces {} just-typed cells", erased);
                self.caret.col = run.start_col;
                self.apply_touched(vec![Touched::row(run.page, run.row)]);
            }
        }

        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                self.feed("\n", now_ms);
            }
            self.feed(line, now_ms);
        }
        self.typing.interrupt();

        self.session.end_batch();
        // Every page stays active through the frame that paints the paste
        if !was_frozen {
            self.thaw_after_frame = true;
        }
    }

    /// Step back one column and lift the top strike there
    pub fn backspace(&mut self, now_ms: u64) {
        if self.caret.col <= self.bounds.left {
            return;
        }
        self.caret.col = (self.caret.col - 1).min(self.bounds.right);
        let GridPos { page, row, col } = self.caret;
        let erased = self.pages.get_mut(page).map_or(0, |p| p.grid.erase(row, col, 1));
        if erased > 0 {
            self.apply_touched(vec![Touched::row(page, row)]);
        }
        self.typing.record_backspace(self.caret, now_ms);
    }

    // === Caret ===

    pub fn move_caret(&mut self, movement: CaretMove) {
        let step = self.layout.line_step;
        let b = self.bounds;
        let mut pos = self.caret;
        match movement {
            CaretMove::Left => pos.col -= 1,
            CaretMove::Right => pos.col += 1,
            CaretMove::Up => {
                if pos.row.0 - step.0 >= b.top.0 {
                    pos.row = pos.row - step;
                } else if pos.page > 0 {
                    pos.page -= 1;
                    pos.row = b.last_line(step);
                }
            }
            CaretMove::Down => match b.next_line(pos.row, step) {
                Some(row) => pos.row = row,
                None if pos.page + 1 < self.pages.len() => {
                    pos.page += 1;
                    pos.row = b.top;
                }
                None => {}
            },
            CaretMove::LineStart => pos.col = b.left,
            CaretMove::LineEnd => {
                pos.col = self
                    .pages
                    .get(pos.page)
                    .and_then(|p| p.grid.occupied_span(pos.row))
                    .map_or(b.left, |(_, last)| last + 1);
            }
        }
        self.set_caret(pos);
    }

    /// Place the caret at a page-space point on `page`
    pub fn click(&mut self, page: usize, x: f32, y: f32) {
        if !(x.is_finite() && y.is_finite()) {
            return;
        }
        let (row, col) = self.layout.hit_test(x, y);
        self.set_caret(GridPos::new(page, row, col));
    }

    fn set_caret(&mut self, pos: GridPos) {
        let page = pos.page.min(self.pages.len().saturating_sub(1));
        let clamped = self.bounds.clamp(GridPos { page, ..pos }, self.layout.line_step);
        if clamped != self.caret {
            self.typing.interrupt();
            self.unsaved = true;
        }
        let page_changed = clamped.page != self.caret.page;
        self.caret = clamped;
        if page_changed {
            self.revirtualize();
        }
    }

    // === Layout changes ===

    fn relayout(&mut self) {
        let (layout, bounds) = compute_layout(
            &self.geometry,
            &self.settings,
            self.face.as_ref(),
            &mut self.resolver,
            self.device_pixel_ratio,
        );
        self.layout = layout;
        self.bounds = bounds;
    }

    fn mark_all_full(&mut self) {
        for page in &mut self.pages {
            page.mark_full();
            self.session.request_paint(page.index);
        }
    }

    /// Apply `change`, then re-flow every page under the new layout.
    ///
    /// The document is flattened under the old bounds and replayed under the
    /// new ones inside a single paint batch.
    fn rewrap(&mut self, change: impl FnOnce(&mut Self)) {
        let (old_bounds, old_step) = (self.bounds, self.layout.line_step);
        self.session.begin_batch();

        let linear = reflow::linearize(&self.pages, &old_bounds, old_step, self.caret);
        change(self);
        self.relayout();
        for page in &mut self.pages {
            page.grid.clear();
        }
        let rebuilt = reflow::rebuild(
            &mut self.pages,
            &linear,
            self.bounds,
            self.layout.line_step,
            self.settings.word_wrap,
        );
        tracing::debug!(
            "Rewrapped {} tokens, caret offset {} now at {:?}",
            linear.tokens.len(),
            linear.caret_offset,
            rebuilt.caret
        );
        self.caret = rebuilt.caret;
        self.typing.interrupt();
        self.mark_all_full();
        self.unsaved = true;

        self.session.end_batch();
        self.revirtualize();
    }

    pub fn set_margins(&mut self, margins: Margins) {
        let margins = margins.sanitized(self.layout.page_width, self.layout.page_height);
        if margins == self.settings.margins {
            return;
        }
        self.rewrap(|doc| doc.settings.margins = margins);
    }

    pub fn set_cpi(&mut self, cpi: f32) {
        let cpi = if cpi.is_finite() {
            cpi.clamp(*CPI_RANGE.start(), *CPI_RANGE.end())
        } else {
            self.settings.cpi
        };
        if cpi == self.settings.cpi {
            return;
        }
        self.rewrap(|doc| doc.settings.cpi = cpi);
    }

    /// Returns false (and changes nothing) for a factor outside the allowed set
    pub fn set_line_height(&mut self, factor: f32) -> bool {
        if !is_allowed_line_height(factor) {
            return false;
        }
        if factor != self.settings.line_height {
            self.rewrap(|doc| doc.settings.line_height = factor);
        }
        true
    }

    pub fn set_ink_width(&mut self, pct: f32) {
        let pct = if pct.is_finite() {
            pct.clamp(0.0, MAX_INK_WIDTH_PCT)
        } else {
            DEFAULT_INK_WIDTH_PCT
        };
        if pct == self.settings.ink_width_pct {
            return;
        }
        self.rewrap(|doc| doc.settings.ink_width_pct = pct);
    }

    /// Only affects what is typed from now on
    pub fn set_word_wrap(&mut self, word_wrap: bool) {
        self.settings.word_wrap = word_wrap;
        self.unsaved = true;
    }

    pub fn set_ink(&mut self, ink: Ink) {
        self.settings.ink = ink;
        self.typing.interrupt();
        self.unsaved = true;
    }

    pub fn set_ink_opacity(&mut self, ink: Ink, pct: f32) {
        let pct = if pct.is_finite() {
            pct.clamp(*OPACITY_RANGE.start(), *OPACITY_RANGE.end())
        } else {
            100.0
        };
        self.settings.ink_opacity[ink.index()] = pct;
        self.mark_all_full();
        self.unsaved = true;
    }

    pub fn set_grain(&mut self, pct: f32) {
        let pct = if pct.is_finite() {
            pct.clamp(*GRAIN_RANGE.start(), *GRAIN_RANGE.end())
        } else {
            0.0
        };
        self.settings.grain_pct = pct;
        self.mark_all_full();
        self.unsaved = true;
    }

    pub fn set_guides(&mut self, show_ruler: bool, show_margin_box: bool) {
        self.settings.show_ruler = show_ruler;
        self.settings.show_margin_box = show_margin_box;
        self.unsaved = true;
    }

    // === Fonts ===

    /// Swap in a new face and re-flow under its metrics
    pub fn set_face(&mut self, face: Arc<dyn FontFace>) {
        tracing::info!("Switching face to '{}'", face.name());
        self.face_generation += 1;
        self.session.invalidate_atlas();
        self.rewrap(|doc| doc.face = face);
    }

    /// Start loading `name` (then the configured candidates) off-thread.
    ///
    /// The result is picked up by `poll`; an older request finishing late
    /// is ignored.
    pub fn request_font(&mut self, name: &str, source: Arc<dyn FontSource>) -> u64 {
        self.settings.font = name.to_string();
        self.unsaved = true;
        let mut candidates = vec![name.to_string()];
        candidates.extend(self.config.fonts.candidates.iter().filter(|c| *c != name).cloned());
        self.fonts.request(candidates, source)
    }

    pub fn fonts(&mut self) -> &mut FontLoader {
        &mut self.fonts
    }

    // === Zoom and device scale ===

    /// Change zoom now; the re-raster at the new scale waits for the debounce
    pub fn set_zoom(&mut self, zoom: f32, now_ms: u64) {
        let zoom = if zoom.is_finite() {
            zoom.clamp(*ZOOM_RANGE.start(), *ZOOM_RANGE.end())
        } else {
            1.0
        };
        self.settings.zoom = zoom;
        self.crisp_redraw_at = Some(now_ms + self.config.timing.crisp_redraw_ms);
        self.unsaved = true;
        self.revirtualize();
    }

    pub fn set_device_pixel_ratio(&mut self, ratio: f32) {
        if !(ratio.is_finite() && ratio > 0.0) || ratio == self.device_pixel_ratio {
            return;
        }
        self.rewrap(|doc| doc.device_pixel_ratio = ratio);
        self.apply_render_scale();
    }

    fn apply_render_scale(&mut self) {
        let scale = clamp_render_scale(
            self.device_pixel_ratio * self.settings.zoom,
            self.layout.page_width,
            self.layout.page_height,
            self.config.render.max_canvas_px,
        );
        if scale != self.render_scale {
            tracing::debug!("Render scale {} -> {}", self.render_scale, scale);
            self.render_scale = scale;
            self.mark_all_full();
        }
    }

    /// Per-frame housekeeping: font completions and the crisp redraw.
    /// Returns true if anything changed.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let mut changed = false;
        if let Some(face) = self.fonts.poll() {
            self.set_face(face);
            changed = true;
        }
        if self.crisp_redraw_at.is_some_and(|due| due <= now_ms) {
            self.crisp_redraw_at = None;
            self.apply_render_scale();
            changed = true;
        }
        changed
    }

    // === Virtualization ===

    pub fn update_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
        self.revirtualize();
    }

    /// While frozen every page stays active
    pub fn freeze(&mut self, frozen: bool) {
        self.thaw_after_frame = false;
        if self.frozen == frozen {
            return;
        }
        self.frozen = frozen;
        self.revirtualize();
    }

    fn revirtualize(&mut self) {
        let woke = if self.frozen {
            let all = 0..=self.pages.len().saturating_sub(1);
            apply_window(&mut self.pages, &all, true)
        } else {
            let Some(viewport) = self.viewport else {
                return;
            };
            let frames = page_frames(self.pages.len(), self.layout.page_height, self.settings.zoom);
            let Some(window) = active_window(&frames, viewport, self.settings.zoom, self.caret.page) else {
                return;
            };
            apply_window(&mut self.pages, &window, false)
        };
        for page in woke {
            self.session.request_paint(page);
        }
    }

    // === Painting ===

    fn atlas_params(&self) -> AtlasParams {
        let font = self.layout.cells.font;
        AtlasParams {
            face: self.face.name().to_string(),
            face_generation: self.face_generation,
            font_size_px: font.font_size_px,
            cell_width: self.layout.cells.cell_width,
            ascent_px: font.ascent_px,
            descent_px: font.descent_px,
            render_scale: self.render_scale,
        }
    }

    fn paint_style(&self) -> PaintStyle {
        let o = self.settings.ink_opacity;
        PaintStyle {
            ink_opacity: [o[0] / 100.0, o[1] / 100.0, o[2] / 100.0],
            grain_pct: self.settings.grain_pct,
            grain_seed: self.settings.grain_seed,
            wear_seed: self.settings.wear_seed,
        }
    }

    /// Paint every page scheduled since the last frame.
    ///
    /// Inside a batch nothing is painted; inactive pages stay dirty.
    pub fn render_frame(&mut self) -> Vec<(usize, PaintKind)> {
        if self.session.in_batch() {
            return Vec::new();
        }
        let params = self.atlas_params();
        let style = self.paint_style();
        let ctx = PaintContext {
            face: self.face.as_ref(),
            layout: &self.layout,
            atlas: &params,
            style: &style,
        };
        let mut painted = Vec::new();
        for index in self.session.take_scheduled() {
            let Some(page) = self.pages.get_mut(index) else {
                continue;
            };
            if let Some(kind) = self.session.paint_page(page, &ctx) {
                painted.push((index, kind));
            }
        }
        if self.thaw_after_frame {
            self.freeze(false);
        }
        painted
    }

    /// Schedule and paint every page, for headless rendering
    pub fn paint_all(&mut self) -> Vec<(usize, PaintKind)> {
        for index in 0..self.pages.len() {
            self.session.request_paint(index);
        }
        self.render_frame()
    }

    // === Export and persistence ===

    pub fn export_text(&self) -> String {
        export::export_text(&self.pages)
    }

    pub fn to_record(&self) -> DocumentRecord {
        let s = &self.settings;
        DocumentRecord {
            v: CURRENT_VERSION,
            font: s.font.clone(),
            margins: s.margins,
            caret: self.caret,
            ink: s.ink,
            show_ruler: s.show_ruler,
            show_margin_box: s.show_margin_box,
            cpi: s.cpi,
            cols: self.geometry.cols_across(s.cpi),
            ink_width_pct: s.ink_width_pct,
            ink_opacity: InkOpacity::from_array(s.ink_opacity),
            line_height: s.line_height,
            zoom: s.zoom,
            grain_pct: s.grain_pct,
            grain_seed: s.grain_seed,
            wear_seed: s.wear_seed,
            word_wrap: s.word_wrap,
            pages: self.pages.iter().map(|p| dump_grid(&p.grid)).collect(),
        }
    }

    /// Build a document from an already validated record
    pub fn from_record(config: TypewriterConfig, face: Arc<dyn FontFace>, record: &DocumentRecord) -> Self {
        let mut doc = Self::with_settings(config, face, record.settings());
        doc.pages = record
            .grids()
            .into_iter()
            .enumerate()
            .map(|(index, grid)| Page { grid, ..Page::new(index) })
            .collect();
        if doc.pages.is_empty() {
            doc.pages.push(Page::new(0));
        }
        let page = record.caret.page.min(doc.pages.len() - 1);
        doc.caret = doc
            .bounds
            .clamp(GridPos { page, ..record.caret }, doc.layout.line_step);
        doc.mark_all_full();
        doc
    }

    /// Parse a persisted document, or fall back to an empty one
    pub fn load_json(config: TypewriterConfig, face: Arc<dyn FontFace>, json: &str) -> Self {
        match DocumentRecord::from_json(json) {
            Ok(record) => Self::from_record(config, face, &record),
            Err(e) => {
                tracing::warn!("Rejected persisted document: {}", e);
                Self::with_face(config, face)
            }
        }
    }

    /// Load whatever the host has stored, if anything
    pub fn restore(config: TypewriterConfig, face: Arc<dyn FontFace>, host: &dyn PersistenceHost) -> Self {
        match host.get(STORAGE_KEY) {
            Some(json) => Self::load_json(config, face, &json),
            None => Self::with_face(config, face),
        }
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        self.to_record().to_json()
    }

    /// Hand unsaved changes to the debouncer and write once they go quiet
    pub fn save_if_due(&mut self, now_ms: u64, host: &mut dyn PersistenceHost) -> bool {
        if self.unsaved {
            match self.to_json() {
                Ok(json) => self.persist.schedule(json, now_ms),
                Err(e) => tracing::warn!("Could not serialize document: {}", e),
            }
            self.unsaved = false;
        }
        self.persist.flush_due(now_ms, host)
    }

    /// Write any pending state immediately
    pub fn flush(&mut self, host: &mut dyn PersistenceHost) -> bool {
        if self.unsaved {
            if let Ok(json) = self.to_json() {
                self.persist.schedule(json, 0);
            }
            self.unsaved = false;
        }
        self.persist.flush(host)
    }

    /// Drop every page and start over with one empty sheet
    pub fn reset(&mut self) {
        tracing::info!("Resetting document ({} pages)", self.pages.len());
        self.session.take_scheduled();
        self.session.clear_grain();
        self.pages = vec![Page::new(0)];
        self.caret = self.bounds.origin(0);
        self.typing.interrupt();
        self.session.request_paint(0);
        self.unsaved = true;
        self.revirtualize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::Mu;

    fn doc() -> Document {
        Document::new(TypewriterConfig::default())
    }

    #[test]
    fn test_new_document_layout() {
        let doc = doc();
        assert_eq!(doc.pages().len(), 1);
        assert_eq!(doc.caret(), doc.bounds().origin(0));
        assert_eq!(doc.layout().cells.cell_width, 10.0);
        assert!(doc.bounds().left < doc.bounds().right);
    }

    #[test]
    fn test_typing_and_backspace() {
        let mut doc = doc();
        let origin = doc.caret();
        doc.type_text("abc", 0);
        assert_eq!(doc.caret().col, origin.col + 3);
        doc.backspace(10);
        assert_eq!(doc.caret().col, origin.col + 2);
        assert_eq!(doc.export_text(), "ab");

        // Backspace stops at the left bound
        for t in 0..5 {
            doc.backspace(20 + t);
        }
        assert_eq!(doc.caret(), origin);
        assert_eq!(doc.export_text(), "");
    }

    #[test]
    fn test_backspace_lifts_one_layer() {
        let mut doc = doc();
        doc.type_text("o", 0);
        doc.move_caret(CaretMove::Left);
        doc.set_ink(Ink::Red);
        doc.type_text("/", 10);
        let at = doc.bounds().origin(0);
        assert_eq!(doc.pages()[0].grid.stack(at.row, at.col).map(|s| s.len()), Some(2));

        doc.backspace(1000);
        assert_eq!(doc.export_text(), "o");
    }

    #[test]
    fn test_paste_replaces_word_just_typed() {
        let mut doc = doc();
        doc.type_text("teh", 0);
        doc.paste("the", 50);
        assert_eq!(doc.export_text(), "the");

        // Too late to replace
        doc.type_text(" cat", 1000);
        doc.paste("s", 5000);
        assert_eq!(doc.export_text(), "the cats");
    }

    #[test]
    fn test_rewrap_on_margin_change() {
        let mut doc = doc();
        doc.type_text("alpha beta gamma delta", 0);
        let before = doc.export_text();
        let wide = doc.bounds().width();

        doc.set_margins(Margins {
            left: 300.0,
            right: 300.0,
            top: 96.0,
            bottom: 96.0,
        });
        assert!(doc.bounds().width() < wide);
        let words = |text: &str| text.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        assert_eq!(words(&doc.export_text()), words(&before));
        assert!(doc.export_text().lines().count() > 1);
        assert!(doc.pages()[0].dirty == crate::page::Dirty::Full);
    }

    #[test]
    fn test_line_height_rejects_unknown_factor() {
        let mut doc = doc();
        assert!(!doc.set_line_height(1.2));
        assert!(doc.set_line_height(2.0));
        doc.type_text("a\nb", 0);
        let rows: Vec<Mu> = doc.pages()[0].grid.rows().map(|(r, _)| r).collect();
        assert_eq!(rows[1].0 - rows[0].0, 16);
    }

    #[test]
    fn test_zoom_redraws_after_debounce() {
        let mut doc = doc();
        doc.render_frame();
        doc.set_zoom(2.0, 1000);
        assert_eq!(doc.render_scale(), 1.0);
        assert!(!doc.poll(1100));
        doc.set_zoom(1.5, 1100);
        assert!(!doc.poll(1200));
        assert!(doc.poll(1250));
        assert_eq!(doc.render_scale(), 1.5);
        assert!(doc.session().is_scheduled(0));
    }

    #[test]
    fn test_reset_leaves_one_empty_page() {
        let mut doc = doc();
        for _ in 0..80 {
            doc.type_text("x\n", 0);
        }
        assert!(doc.pages().len() > 1);
        doc.reset();
        assert_eq!(doc.pages().len(), 1);
        assert!(doc.pages()[0].grid.is_empty());
        assert_eq!(doc.caret(), doc.bounds().origin(0));
    }

    #[test]
    fn test_reset_drops_grain_masks() {
        let mut doc = doc();
        doc.type_text(&"x\n".repeat(80), 0);
        doc.paint_all();
        assert_eq!(doc.session().grain().len(), doc.pages().len());

        doc.reset();
        assert!(doc.session().grain().is_empty());
        doc.render_frame();
        assert_eq!(doc.session().grain().len(), 1);
    }

    #[test]
    fn test_caret_moves_clamp() {
        let mut doc = doc();
        let origin = doc.caret();
        doc.move_caret(CaretMove::Left);
        doc.move_caret(CaretMove::Up);
        assert_eq!(doc.caret(), origin);
        doc.move_caret(CaretMove::Down);
        assert_eq!(doc.caret().row, origin.row + doc.layout().line_step);
        doc.type_text("abc", 0);
        doc.move_caret(CaretMove::LineStart);
        assert_eq!(doc.caret().col, origin.col);
        doc.move_caret(CaretMove::LineEnd);
        assert_eq!(doc.caret().col, origin.col + 3);
    }

    #[test]
    fn test_click_snaps_into_bounds() {
        let mut doc = doc();
        doc.click(0, 1.0, 1.0);
        assert_eq!(doc.caret(), doc.bounds().origin(0));
        doc.click(3, 10_000.0, 10_000.0);
        let b = doc.bounds();
        assert_eq!(doc.caret().page, 0);
        assert_eq!(doc.caret().col, b.right + 1);
        assert_eq!(doc.caret().row, b.last_line(doc.layout().line_step));
    }
}
