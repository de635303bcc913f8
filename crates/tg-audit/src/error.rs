// error.rs - Error types for the audit subsystem.
//
// Only misuse surfaces here (bad import data, RNG failure). Tampering is
// reported as data by `AuditLog::verify_integrity`, never as an error.

use thiserror::Error;

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The system random source failed while generating a secret key.
    #[error("failed to generate secret key: system random source unavailable")]
    KeyGeneration,

    /// A secret key was supplied with no key material.
    #[error("secret key must not be empty")]
    EmptyKey,

    /// A severity name that is not one of info, low, medium, high, critical.
    #[error("unknown audit severity '{0}'")]
    UnknownSeverity(String),

    /// Failed to serialize or deserialize entries (malformed JSON).
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
