//! Error types for suiterun

use thiserror::Error;

/// Result type alias using the suiterun common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding requests and wire types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Unknown language family: {0}")]
    UnknownFamily(String),
}
