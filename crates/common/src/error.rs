//! Error types for fxt-common

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while patching files, unpacking artifacts or reading
/// extension metadata
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Anchor not found: no line precedes a line containing '{anchor}'")]
    AnchorNotFound { anchor: String },

    #[error("Marker not found: no line contains '{marker}'")]
    MarkerNotFound { marker: String },

    #[error("Token not found: '{token}' does not occur in {}", path.display())]
    TokenNotFound { token: String, path: PathBuf },

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Path traversal detected: {0}")]
    PathTraversal(String),

    #[error("Missing field '{field}' in {}", path.display())]
    MissingField { field: String, path: PathBuf },

    #[error("Checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::InvalidArchive(e.to_string())
    }
}
