use std::path::PathBuf;
use thiserror::Error;

/// Errors raised at the edges of the crate (filesystem, config, event feed).
///
/// The layout core itself never fails; see `tree`, `radial_layout`,
/// `collision` and `overlay`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("path does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
