// error.rs - Error types for the policy subsystem.
//
// Policy outcomes are never errors. These cover names that do not parse
// and restriction configurations that cannot be honoured.

use thiserror::Error;

/// Errors that can occur during policy operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// An operation name did not match any known capability.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// A permission level name did not match any known level.
    #[error("unknown permission level '{0}'")]
    UnknownLevel(String),

    /// A restriction lists both allowed and denied paths.
    #[error("restriction for '{operation}' cannot have both allowed and denied paths")]
    ConflictingPathLists { operation: String },
}
