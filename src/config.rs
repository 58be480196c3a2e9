//! Configuration management for the typed page
//!
//! Everything here is a tunable of the engine, not of a document. Document
//! settings (margins, pitch, inks) travel with the persisted record instead.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TypewriterConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub fonts: FontConfig,
}

/// Coalescing windows, all in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Gap after which a run of typed characters stops coalescing
    #[serde(default = "default_typed_run_ms")]
    pub typed_run_ms: u64,
    /// A paste this soon after typing replaces the word just typed
    #[serde(default = "default_paste_replace_ms")]
    pub paste_replace_ms: u64,
    /// Backspaces closer together than this form one burst
    #[serde(default = "default_backspace_burst_ms")]
    pub backspace_burst_ms: u64,
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,
    /// Quiet period after a zoom change before re-rasterizing at the new scale
    #[serde(default = "default_crisp_redraw_ms")]
    pub crisp_redraw_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderConfig {
    /// Largest canvas edge the platform can allocate
    #[serde(default = "default_max_canvas_px")]
    pub max_canvas_px: u32,
    #[serde(default = "default_atlas_columns")]
    pub atlas_columns: u32,
    #[serde(default = "default_atlas_gutter_px")]
    pub atlas_gutter_px: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FontConfig {
    /// Face names tried in order; the built-in fallback face always ends the list
    #[serde(default = "default_font_candidates")]
    pub candidates: Vec<String>,
    /// Directories searched for `<name>.ttf` / `<name>.otf`
    #[serde(default)]
    pub dirs: Vec<String>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            typed_run_ms: default_typed_run_ms(),
            paste_replace_ms: default_paste_replace_ms(),
            backspace_burst_ms: default_backspace_burst_ms(),
            persist_debounce_ms: default_persist_debounce_ms(),
            crisp_redraw_ms: default_crisp_redraw_ms(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_canvas_px: default_max_canvas_px(),
            atlas_columns: default_atlas_columns(),
            atlas_gutter_px: default_atlas_gutter_px(),
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            candidates: default_font_candidates(),
            dirs: Vec::new(),
        }
    }
}

fn default_typed_run_ms() -> u64 { 500 }
fn default_paste_replace_ms() -> u64 { 200 }
fn default_backspace_burst_ms() -> u64 { 250 }
fn default_persist_debounce_ms() -> u64 { 400 }
fn default_crisp_redraw_ms() -> u64 { 150 }
fn default_max_canvas_px() -> u32 { 8192 }
fn default_atlas_columns() -> u32 { 16 }
fn default_atlas_gutter_px() -> u32 { 2 }
fn default_font_candidates() -> Vec<String> {
    vec![
        "Special Elite".to_string(),
        "Courier Prime".to_string(),
        "Courier New".to_string(),
    ]
}

impl TypewriterConfig {
    /// Load configuration from a TOML file, or defaults if it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config = Self::from_toml_str(&content)?;
            tracing::info!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            tracing::info!("No {} found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Parse a user-entered number, clamping to `[min, max]`.
///
/// Empty or unparsable input yields `default`. Never fails.
pub fn sanitize_number(raw: &str, min: f32, max: f32, default: f32) -> f32 {
    let trimmed = raw.trim();
    match trimmed.parse::<f32>() {
        Ok(value) if value.is_finite() => value.clamp(min, max),
        _ => default.clamp(min, max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TypewriterConfig::from_toml_str(
            r#"
            [timing]
            backspace_burst_ms = 300

            [render]
            max_canvas_px = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.timing.backspace_burst_ms, 300);
        assert_eq!(config.timing.typed_run_ms, 500);
        assert_eq!(config.render.max_canvas_px, 4096);
        assert_eq!(config.render.atlas_columns, 16);
        assert_eq!(config.fonts.candidates.len(), 3);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = TypewriterConfig::load("definitely/not/here.toml").unwrap();
        assert_eq!(config.render.max_canvas_px, 8192);
    }

    #[test]
    fn test_sanitize_number() {
        assert_eq!(sanitize_number("84", 0.0, 150.0, 84.0), 84.0);
        assert_eq!(sanitize_number(" 200 ", 0.0, 150.0, 84.0), 150.0);
        assert_eq!(sanitize_number("-3", 0.0, 150.0, 84.0), 0.0);
        assert_eq!(sanitize_number("", 0.0, 150.0, 84.0), 84.0);
        assert_eq!(sanitize_number("abc", 0.0, 150.0, 84.0), 84.0);
        assert_eq!(sanitize_number("NaN", 0.0, 150.0, 84.0), 84.0);
    }
}
