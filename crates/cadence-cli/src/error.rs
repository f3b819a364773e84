//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Provision(#[from] cadence_provision::ProvisionError),

    #[error("cannot read {path}: {source}")]
    ReadDocument {
        path: PathBuf,
        source: std::io::Error,
    },
}
