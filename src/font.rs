//! Font faces - measurement, rasterization and loading
//!
//! A `FontFace` is the only thing the rest of the engine knows about fonts:
//! it measures advances and line metrics and rasterizes coverage bitmaps.
//! Real faces are parsed with fontdue; `FallbackFace` is the always-available
//! synthetic monospace face that ends every candidate list.

use crate::error::FontError;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Vertical font metrics at a size, both measured positive from the baseline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub ascent: f32,
    pub descent: f32,
}

/// Rasterized coverage of one glyph
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphBitmap {
    pub width: usize,
    pub height: usize,
    /// Left bearing from the pen position
    pub xmin: i32,
    /// Bottom edge relative to the baseline, positive up
    pub ymin: i32,
    pub advance: f32,
    /// Row-major coverage, top row first
    pub coverage: Vec<u8>,
}

pub trait FontFace: Send + Sync {
    fn name(&self) -> &str;

    /// Horizontal advance of `ch` at `size_px`, if the face can measure it
    fn advance(&self, ch: char, size_px: f32) -> Option<f32>;

    fn line_metrics(&self, size_px: f32) -> Option<LineMetrics>;

    fn rasterize(&self, ch: char, size_px: f32) -> Option<GlyphBitmap>;
}

// === fontdue faces ===

/// A face parsed from TTF/OTF bytes
pub struct FontdueFace {
    name: String,
    font: fontdue::Font,
}

impl FontdueFace {
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, FontError> {
        let name = name.into();
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|reason| FontError::Parse {
                name: name.clone(),
                reason: reason.to_string(),
            })?;
        Ok(Self { name, font })
    }
}

impl FontFace for FontdueFace {
    fn name(&self) -> &str {
        &self.name
    }

    fn advance(&self, ch: char, size_px: f32) -> Option<f32> {
        if self.font.lookup_glyph_index(ch) == 0 && ch != ' ' {
            return None;
        }
        Some(self.font.metrics(ch, size_px).advance_width)
    }

    fn line_metrics(&self, size_px: f32) -> Option<LineMetrics> {
        let metrics = self.font.horizontal_line_metrics(size_px)?;
        Some(LineMetrics {
            ascent: metrics.ascent,
            descent: metrics.descent.abs(),
        })
    }

    fn rasterize(&self, ch: char, size_px: f32) -> Option<GlyphBitmap> {
        if self.font.lookup_glyph_index(ch) == 0 {
            return None;
        }
        let (metrics, coverage) = self.font.rasterize(ch, size_px);
        Some(GlyphBitmap {
            width: metrics.width,
            height: metrics.height,
            xmin: metrics.xmin,
            ymin: metrics.ymin,
            advance: metrics.advance_width,
            coverage,
        })
    }
}

// === Fallback face ===

/// Synthetic monospace face: 0.6 em advance, hollow box glyphs
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackFace;

impl FallbackFace {
    pub const NAME: &'static str = "monospace";
    const ADVANCE_EM: f32 = 0.6;
}

impl FontFace for FallbackFace {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn advance(&self, ch: char, size_px: f32) -> Option<f32> {
        if ch.is_control() {
            return None;
        }
        Some(size_px * Self::ADVANCE_EM)
    }

    fn line_metrics(&self, size_px: f32) -> Option<LineMetrics> {
        Some(LineMetrics {
            ascent: size_px * 0.8,
            descent: size_px * 0.2,
        })
    }

    fn rasterize(&self, ch: char, size_px: f32) -> Option<GlyphBitmap> {
        if ch.is_control() {
            return None;
        }
        let advance = size_px * Self::ADVANCE_EM;
        if ch.is_whitespace() {
            return Some(GlyphBitmap {
                width: 0,
                height: 0,
                xmin: 0,
                ymin: 0,
                advance,
                coverage: Vec::new(),
            });
        }
        let width = (size_px * 0.5).round().max(1.0) as usize;
        let height = (size_px * 0.7).round().max(1.0) as usize;
        let stroke = (size_px / 12.0).round().max(1.0) as usize;
        let mut coverage = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                let edge = x < stroke || y < stroke || x + stroke >= width || y + stroke >= height;
                if edge {
                    coverage[y * width + x] = 255;
                }
            }
        }
        Some(GlyphBitmap {
            width,
            height,
            xmin: ((advance - width as f32) / 2.0).round() as i32,
            ymin: 0,
            advance,
            coverage,
        })
    }
}

// === Font sources ===

/// Where face bytes come from
pub trait FontSource: Send + Sync {
    fn load(&self, name: &str) -> Result<Vec<u8>, FontError>;
}

/// Looks for `<dir>/<name>.ttf` or `.otf` in each directory
#[derive(Debug, Clone, Default)]
pub struct DirFontSource {
    dirs: Vec<PathBuf>,
}

impl DirFontSource {
    pub fn new(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }
}

impl FontSource for DirFontSource {
    fn load(&self, name: &str) -> Result<Vec<u8>, FontError> {
        for dir in &self.dirs {
            for ext in ["ttf", "otf"] {
                let path = dir.join(format!("{name}.{ext}"));
                if path.is_file() {
                    return Ok(std::fs::read(path)?);
                }
            }
        }
        Err(FontError::NotFound(name.to_string()))
    }
}

/// Try each candidate in order; the fallback face ends the list.
pub fn resolve_face(candidates: &[String], source: &dyn FontSource) -> Arc<dyn FontFace> {
    for name in candidates {
        let face = source
            .load(name)
            .and_then(|bytes| FontdueFace::from_bytes(name.clone(), &bytes));
        match face {
            Ok(face) if face.advance('M', 16.0).is_some() => {
                tracing::debug!("Resolved font face '{}'", name);
                return Arc::new(face);
            }
            Ok(_) => tracing::debug!("Font '{}' cannot measure glyphs, skipping", name),
            Err(e) => tracing::debug!("Font '{}' unavailable: {}", name, e),
        }
    }
    tracing::info!("No font candidate available, using built-in {}", FallbackFace::NAME);
    Arc::new(FallbackFace)
}

// === Loading ===

type Completion = (u64, Arc<dyn FontFace>);

/// Off-thread font loading guarded by a request sequence number.
///
/// Only the completion of the most recent request is ever handed out; an
/// older request finishing late is dropped.
pub struct FontLoader {
    latest: u64,
    slot: Arc<Mutex<Option<Completion>>>,
}

impl FontLoader {
    pub fn new() -> Self {
        Self {
            latest: 0,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Sequence number of the newest request
    pub fn latest(&self) -> u64 {
        self.latest
    }

    /// Start a new request and return its sequence number
    pub fn begin(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    /// Resolve `candidates` on a worker thread
    pub fn request(&mut self, candidates: Vec<String>, source: Arc<dyn FontSource>) -> u64 {
        let seq = self.begin();
        let slot = Arc::clone(&self.slot);
        std::thread::spawn(move || {
            let face = resolve_face(&candidates, source.as_ref());
            store_completion(&slot, seq, face);
        });
        seq
    }

    /// Hand in a completion produced elsewhere (e.g. by the host)
    pub fn complete(&self, seq: u64, face: Arc<dyn FontFace>) {
        store_completion(&self.slot, seq, face);
    }

    /// Take the pending completion if it answers the newest request
    pub fn poll(&mut self) -> Option<Arc<dyn FontFace>> {
        let (seq, face) = self.slot.lock().take()?;
        if seq != self.latest {
            tracing::debug!("Dropping stale font completion {} (latest {})", seq, self.latest);
            return None;
        }
        Some(face)
    }
}

impl Default for FontLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn store_completion(slot: &Mutex<Option<Completion>>, seq: u64, face: Arc<dyn FontFace>) {
    let mut slot = slot.lock();
    if slot.as_ref().is_some_and(|(stored, _)| *stored > seq) {
        return;
    }
    *slot = Some((seq, face));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    struct MissingSource;

    impl FontSource for MissingSource {
        fn load(&self, name: &str) -> Result<Vec<u8>, FontError> {
            Err(FontError::NotFound(name.to_string()))
        }
    }

    struct GarbageSource;

    impl FontSource for GarbageSource {
        fn load(&self, _name: &str) -> Result<Vec<u8>, FontError> {
            Ok(vec![0, 1, 2, 3])
        }
    }

    #[test]
    fn test_fallback_face_measures_and_rasterizes() {
        let face = FallbackFace;
        assert_eq!(face.advance('M', 20.0), Some(12.0));
        assert_eq!(face.advance('\n', 20.0), None);
        let metrics = face.line_metrics(20.0).unwrap();
        assert_eq!((metrics.ascent, metrics.descent), (16.0, 4.0));

        let glyph = face.rasterize('A', 20.0).unwrap();
        assert_eq!((glyph.width, glyph.height), (10, 14));
        assert_eq!(glyph.coverage.len(), 140);
        assert_eq!(glyph.coverage[0], 255);

        let space = face.rasterize(' ', 20.0).unwrap();
        assert!(space.coverage.is_empty());
    }

    #[test]
    fn test_resolve_falls_back_through_candidates() {
        let candidates = vec!["Nope".to_string(), "Also Nope".to_string()];
        assert_eq!(resolve_face(&candidates, &MissingSource).name(), FallbackFace::NAME);
        assert_eq!(resolve_face(&candidates, &GarbageSource).name(), FallbackFace::NAME);
        assert_eq!(resolve_face(&[], &MissingSource).name(), FallbackFace::NAME);
    }

    #[test]
    fn test_stale_completion_is_dropped() {
        let mut loader = FontLoader::new();
        let first = loader.begin();
        let second = loader.begin();

        loader.complete(first, Arc::new(FallbackFace));
        assert!(loader.poll().is_none());

        loader.complete(second, Arc::new(FallbackFace));
        loader.complete(first, Arc::new(FallbackFace));
        assert!(loader.poll().is_some());
        assert!(loader.poll().is_none());
    }

    #[test]
    fn test_threaded_request_completes() {
        let mut loader = FontLoader::new();
        loader.request(vec!["Nope".to_string()], Arc::new(MissingSource));

        let deadline = Instant::now() + Duration::from_secs(5);
        let face = loop {
            if let Some(face) = loader.poll() {
                break face;
            }
            assert!(Instant::now() < deadline, "font load never completed");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(face.name(), FallbackFace::NAME);
    }
}
