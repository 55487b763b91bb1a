//! Error taxonomy shared by the reference, batching and checking modules

use thiserror::Error;

/// Errors raised by the core.
///
/// `Clone` because a single failed remote call fails every handle of its chunk.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// URL resembles a kind's pattern but is not a valid reference of that kind.
    /// Recoverable: the caller tries the next kind.
    #[error("not a valid {kind} reference: {url}")]
    InvalidReference { kind: &'static str, url: String },

    /// A persisted record does not deserialize into its declared kind.
    #[error("invalid {kind} item in status file: {reason}")]
    InvalidItem { kind: String, reason: String },

    /// Remote call returned a non-success status or could not be performed.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Internal defect (abandoned result handle, mismatched reply).
    #[error("internal contract violated: {0}")]
    ContractViolation(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
