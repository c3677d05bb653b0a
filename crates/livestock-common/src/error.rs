//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for shared-type operations
pub type Result<T> = std::result::Result<T, LivestockError>;

/// Errors raised by the shared domain types
#[derive(Error, Debug)]
pub enum LivestockError {
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
