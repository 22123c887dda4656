//! Error types shared across the ETL workspace

use thiserror::Error;

/// Result type alias for shared ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Errors raised by the shared types
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
