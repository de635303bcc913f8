// error.rs - Error types for the publisher registry and signer.

use thiserror::Error;

/// Configuration and programmer errors. Trust and signature decisions are
/// returned as values and never show up here.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("publisher {0} must not be empty")]
    EmptyField(&'static str),

    #[error("invalid trust level '{0}' (expected untrusted, community, verified or official)")]
    InvalidTrustLevel(String),

    #[error("publisher '{0}' is already registered")]
    DuplicatePublisher(String),

    #[error("publisher '{0}' is not registered")]
    UnknownPublisher(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
