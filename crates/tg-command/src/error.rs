// error.rs - Error types for command analysis.

use thiserror::Error;

/// Errors that can occur while configuring command analysis.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A custom pattern is not a valid regular expression.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// A severity or category name did not parse.
    #[error("unknown {kind} '{value}'")]
    UnknownName { kind: &'static str, value: String },
}
