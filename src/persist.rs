//! Versioned document record and debounced saving
//!
//! The record is a direct dump of every sparse grid plus the document
//! settings, serialized as JSON. Loading is all-or-nothing: a record that
//! fails any check is rejected whole.

use crate::bounds::{is_allowed_line_height, Margins};
use crate::coordinates::{GridPos, Mu};
use crate::document::{Settings, CPI_RANGE, GRAIN_RANGE, OPACITY_RANGE, ZOOM_RANGE};
use crate::error::PersistError;
use crate::grid::{Glyph, Grid, Ink};
use crate::metrics::MAX_INK_WIDTH_PCT;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Key the document is stored under in the persistence host
pub const STORAGE_KEY: &str = "typewriter-page.document";

pub const CURRENT_VERSION: u32 = 1;
pub const SUPPORTED_VERSIONS: RangeInclusive<u32> = 1..=1;

/// Base opacity per ink, 0-100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InkOpacity {
    pub black: f32,
    pub red: f32,
    pub white: f32,
}

impl InkOpacity {
    pub fn from_array([black, red, white]: [f32; 3]) -> Self {
        Self { black, red, white }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.black, self.red, self.white]
    }
}

/// One row: `(row, [(column, stack), ...])`
pub type RowRecord = (Mu, Vec<(i32, Vec<Glyph>)>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub v: u32,
    pub font: String,
    pub margins: Margins,
    pub caret: GridPos,
    pub ink: Ink,
    pub show_ruler: bool,
    pub show_margin_box: bool,
    pub cpi: f32,
    /// Derived from `cpi`; stored for readers that do not know the page size
    pub cols: f32,
    pub ink_width_pct: f32,
    pub ink_opacity: InkOpacity,
    pub line_height: f32,
    pub zoom: f32,
    pub grain_pct: f32,
    pub grain_seed: u32,
    pub wear_seed: u32,
    pub word_wrap: bool,
    pub pages: Vec<Vec<RowRecord>>,
}

#[derive(Deserialize)]
struct VersionProbe {
    v: u32,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> PersistError {
    PersistError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn check_range(field: &'static str, value: f32, range: &RangeInclusive<f32>) -> Result<(), PersistError> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, format!("{} outside {:?}", value, range)))
    }
}

/// Serialize one grid in row/column order
pub fn dump_grid(grid: &Grid) -> Vec<RowRecord> {
    grid.rows()
        .map(|(row, cells)| {
            let cells = cells.iter().map(|(col, stack)| (*col, stack.clone())).collect();
            (row, cells)
        })
        .collect()
}

impl DocumentRecord {
    pub fn settings(&self) -> Settings {
        Settings {
            font: self.font.clone(),
            margins: self.margins,
            ink: self.ink,
            show_ruler: self.show_ruler,
            show_margin_box: self.show_margin_box,
            cpi: self.cpi,
            ink_width_pct: self.ink_width_pct,
            ink_opacity: self.ink_opacity.to_array(),
            line_height: self.line_height,
            zoom: self.zoom,
            grain_pct: self.grain_pct,
            grain_seed: self.grain_seed,
            wear_seed: self.wear_seed,
            word_wrap: self.word_wrap,
        }
    }

    pub fn grids(&self) -> Vec<Grid> {
        self.pages
            .iter()
            .map(|rows| Grid::from_rows(rows.iter().cloned()))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate. The version is checked before anything else.
    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let probe: VersionProbe = serde_json::from_str(json)?;
        if !SUPPORTED_VERSIONS.contains(&probe.v) {
            return Err(PersistError::UnsupportedVersion {
                found: probe.v,
                min: *SUPPORTED_VERSIONS.start(),
                max: *SUPPORTED_VERSIONS.end(),
            });
        }
        let record: Self = serde_json::from_str(json)?;
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<(), PersistError> {
        let m = self.margins;
        if [m.left, m.right, m.top, m.bottom]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(invalid("margins", "must be finite and non-negative"));
        }
        check_range("cpi", self.cpi, &CPI_RANGE)?;
        check_range("inkWidthPct", self.ink_width_pct, &(0.0..=MAX_INK_WIDTH_PCT))?;
        for value in self.ink_opacity.to_array() {
            check_range("inkOpacity", value, &OPACITY_RANGE)?;
        }
        if !is_allowed_line_height(self.line_height) {
            return Err(invalid("lineHeight", format!("{} is not an allowed factor", self.line_height)));
        }
        check_range("zoom", self.zoom, &ZOOM_RANGE)?;
        check_range("grainPct", self.grain_pct, &GRAIN_RANGE)?;
        if self.caret.row.0 < 0 || self.caret.col < 0 {
            return Err(invalid("caret", "negative coordinate"));
        }
        if !self.pages.is_empty() && self.caret.page >= self.pages.len() {
            return Err(invalid("caret", format!("page {} of {}", self.caret.page, self.pages.len())));
        }
        let bad_glyph = self
            .pages
            .iter()
            .flatten()
            .flat_map(|(_, cells)| cells)
            .flat_map(|(_, stack)| stack)
            .find(|glyph| glyph.ch.is_control());
        if let Some(glyph) = bad_glyph {
            return Err(invalid("pages", format!("control character {:?}", glyph.ch)));
        }
        Ok(())
    }
}

// === Saving ===

/// Durable key/value storage supplied by the host
pub trait PersistenceHost {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
}

/// In-memory host, for headless use and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    entries: ahash::AHashMap<String, String>,
}

impl PersistenceHost for MemoryHost {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }
}

/// Keeps only the newest serialized state and writes it once changes go quiet
#[derive(Debug, Clone)]
pub struct PersistScheduler {
    debounce_ms: u64,
    pending: Option<(String, u64)>,
    writes: u64,
}

impl PersistScheduler {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            pending: None,
            writes: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of writes made to a host so far
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Replace any pending state and restart the quiet period
    pub fn schedule(&mut self, json: String, now_ms: u64) {
        self.pending = Some((json, now_ms + self.debounce_ms));
    }

    /// Write the pending state if its quiet period has elapsed
    pub fn flush_due(&mut self, now_ms: u64, host: &mut dyn PersistenceHost) -> bool {
        match &self.pending {
            Some((_, due)) if *due <= now_ms => self.flush(host),
            _ => false,
        }
    }

    /// Write the pending state now
    pub fn flush(&mut self, host: &mut dyn PersistenceHost) -> bool {
        let Some((json, _)) = self.pending.take() else {
            return false;
        };
        host.set(STORAGE_KEY, json);
        self.writes += 1;
        true
    }
}
