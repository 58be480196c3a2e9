//! Which pages keep a live canvas
//!
//! Pages near the viewport (and always the caret's page) are active. Inactive
//! pages keep their grid but drop their canvases and are never painted.

use crate::page::Page;
use std::ops::RangeInclusive;

/// Vertical gap between stacked pages, in CSS pixels before zoom
pub const PAGE_GAP_PX: f32 = 24.0;

/// Visible part of the scrolled document, in zoomed CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub top: f32,
    pub height: f32,
}

impl Viewport {
    pub fn center(&self) -> f32 {
        self.top + self.height / 2.0
    }
}

/// Where a page's wrapper sits in the scrolled document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    pub top: f32,
    pub height: f32,
}

impl PageFrame {
    pub fn center(&self) -> f32 {
        self.top + self.height / 2.0
    }
}

/// Frames of `count` pages stacked top to bottom at `zoom`
pub fn page_frames(count: usize, page_height: f32, zoom: f32) -> Vec<PageFrame> {
    let height = page_height * zoom;
    let stride = height + PAGE_GAP_PX * zoom;
    (0..count)
        .map(|i| PageFrame {
            top: i as f32 * stride,
            height,
        })
        .collect()
}

/// Pages kept active on each side of the centred page
pub fn window_half_width(zoom: f32) -> usize {
    if zoom >= 1.5 {
        0
    } else if zoom >= 1.0 {
        1
    } else {
        2
    }
}

/// Page whose centre is closest to `y`
pub fn nearest_page(frames: &[PageFrame], y: f32) -> Option<usize> {
    frames
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let da = (a.center() - y).abs();
            let db = (b.center() - y).abs();
            da.total_cmp(&db)
        })
        .map(|(i, _)| i)
}

/// Range of pages to keep active, or `None` when there is nothing to decide
pub fn active_window(
    frames: &[PageFrame],
    viewport: Viewport,
    zoom: f32,
    caret_page: usize,
) -> Option<RangeInclusive<usize>> {
    if frames.is_empty() || !(viewport.height > 0.0) {
        return None;
    }
    let center = nearest_page(frames, viewport.center())?;
    let half = window_half_width(zoom);
    let last = frames.len() - 1;
    let caret_page = caret_page.min(last);

    let lo = center.saturating_sub(half).min(caret_page);
    let hi = (center + half).min(last).max(caret_page);
    Some(lo..=hi)
}

/// Activate pages inside `window` (every page while `frozen`).
///
/// Returns the pages that just became active and need a full paint.
pub fn apply_window(pages: &mut [Page], window: &RangeInclusive<usize>, frozen: bool) -> Vec<usize> {
    pages
        .iter_mut()
        .filter_map(|page| {
            let active = frozen || window.contains(&page.index);
            (page.set_active(active) && active).then_some(page.index)
        })
        .collect()
}
