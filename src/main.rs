//! Headless typewriter page tool
//!
//! Types text onto pages, exports documents as plain text and renders their
//! pages to PNG without any window.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use typewriter_page::font::{resolve_face, DirFontSource, FallbackFace, FontFace, FontdueFace};
use typewriter_page::{Document, TypewriterConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "typewriter-page", version, about = "Typewriter page engine")]
struct Args {
    /// Configuration file (defaults to `typewriter.toml` if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Type a text file onto a fresh document and save it as JSON
    Type {
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Characters per inch
        #[arg(long, default_value_t = 10.0)]
        cpi: f32,
    },
    /// Print a document as plain text
    Export { doc: PathBuf },
    /// Paint every page of a document to `<out>/page-<n>.png`
    Render {
        doc: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Font file to draw with instead of the configured candidates
        #[arg(long)]
        font: Option<PathBuf>,
        /// Device pixel ratio
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = TypewriterConfig::load(args.config.as_deref().unwrap_or(Path::new("typewriter.toml")))?;

    match args.command {
        Command::Type { input, out, cpi } => {
            let text = std::fs::read_to_string(&input)?;
            let mut doc = Document::with_face(config.clone(), configured_face(&config));
            doc.set_cpi(cpi);
            doc.paste(&text, 0);
            std::fs::write(&out, doc.to_json()?)?;
            tracing::info!("Typed {} onto {} pages", input.display(), doc.pages().len());
        }
        Command::Export { doc } => {
            let json = std::fs::read_to_string(&doc)?;
            let doc = Document::load_json(config, Arc::new(FallbackFace), &json);
            println!("{}", doc.export_text());
        }
        Command::Render { doc, out, font, scale } => {
            let face = match font {
                Some(path) => load_face_file(&path)?,
                None => configured_face(&config),
            };
            let json = std::fs::read_to_string(&doc)?;
            let mut doc = Document::load_json(config, face, &json);
            doc.set_device_pixel_ratio(scale);
            doc.freeze(true);
            doc.paint_all();

            std::fs::create_dir_all(&out)?;
            for index in 0..doc.pages().len() {
                let Some(surface) = doc.page_surface(index) else {
                    continue;
                };
                let image = image::RgbaImage::from_raw(surface.width(), surface.height(), surface.to_rgba_bytes())
                    .ok_or("surface size does not match its pixels")?;
                let path = out.join(format!("page-{}.png", index + 1));
                image.save(&path)?;
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

fn configured_face(config: &TypewriterConfig) -> Arc<dyn FontFace> {
    let source = DirFontSource::new(config.fonts.dirs.iter().cloned());
    resolve_face(&config.fonts.candidates, &source)
}

fn load_face_file(path: &Path) -> Result<Arc<dyn FontFace>, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "custom".to_string());
    Ok(Arc::new(FontdueFace::from_bytes(name, &bytes)?))
}
