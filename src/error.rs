use thiserror::Error;

/// Errors produced while loading a persisted document.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported document version {found} (supported {min}..={max})")]
    UnsupportedVersion { found: u32, min: u32, max: u32 },

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Errors produced while resolving a font face.
#[derive(Debug, Error)]
pub enum FontError {
    #[error("font '{0}' not found")]
    NotFound(String),

    #[error("font '{name}' could not be parsed: {reason}")]
    Parse { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
