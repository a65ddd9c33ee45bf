//! Error types for the trust store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("backend: {0}")]
    Backend(String),
}
