use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LocateError>;

#[derive(Debug, Error)]
pub enum LocateError {
    /// The template could not be read or decoded. Nothing has been scanned when this is returned.
    #[error("failed to load template {path}: {source}")]
    TemplateLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("no monitors available to search")]
    NoMonitors,

    #[error("monitor {0} was not among the captured monitors")]
    MonitorNotFound(u32),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to write debug artifact: {0}")]
    Debug(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialize error: {0}")]
    Toml(#[from] toml::de::Error),
}
