pub mod atlas;
pub mod bounds;
pub mod config;
pub mod coordinates; // Coordinate system abstraction
pub mod document;
pub mod error;
pub mod export;
pub mod font;
pub mod grain;
pub mod grid;
pub mod metrics;
pub mod page;
pub mod painter;
pub mod persist;
pub mod raster;
pub mod reflow;
pub mod typing;
pub mod virtualize;

// Re-export core types
pub use bounds::{Bounds, Margins, PageLayout};
pub use config::TypewriterConfig;
pub use coordinates::{GridPos, Mu, PageGeometry};
pub use document::{CaretMove, Document, Settings};
pub use error::{ConfigError, FontError, PersistError};
pub use grid::{Glyph, Grid, Ink};
pub use page::Page;
pub use painter::{PaintKind, RenderSession};
pub use persist::{DocumentRecord, PersistenceHost};
