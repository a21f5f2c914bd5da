//! Common error types for WEFT

use thiserror::Error;

/// Common result type for WEFT operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the fabrication core.
///
/// Four categories so callers can differentiate bad input from missing
/// records from missing privileges from storage failures:
/// - `Validation`: bad input — illegal state transition, duplicate embed
///   key, missing required binding, immutable-field change. Never
///   auto-retried.
/// - `NotFound`: referenced Chain/Segment/parent does not exist.
/// - `Privilege`: capability lacks the required account or role.
/// - `Fatal`: persistence or serialization failure; non-recoverable for
///   the current call, the caller may retry the whole operation.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid user input or request parameter
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Capability lacks a required account or role
    #[error("Insufficient privilege: {0}")]
    Privilege(String),

    /// Non-recoverable internal failure
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Fatal(format!("serialization: {e}"))
    }
}

impl Error {
    /// Standard message for a rejected state transition.
    pub fn transition(entity: &str, from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Error::Validation(format!("{entity} cannot transition from {from} to {to}"))
    }
}
