//! Error types for live bindings and provisioning.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for store, subscription and provisioning operations.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

}

impl BindError {
    /// Classify this error for display in a binding state.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BindError::InvalidReference(_) => ErrorKind::InvalidReference,
            BindError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            BindError::MalformedRecord(_) => ErrorKind::MalformedRecord,
            BindError::Transport(_) | BindError::Serialization(_) => {
                ErrorKind::TransportFailure
            }
        }
    }
}

impl From<serde_json::Error> for BindError {
    fn from(e: serde_json::Error) -> Self {
        BindError::Serialization(e.to_string())
    }
}

/// Comparable error classification exposed through `BindingState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed document locator or query. A programming error.
    InvalidReference,
    /// The remote watch, read or write failed (network, permission, quota).
    TransportFailure,
    /// A role check failed. A normal settled state, not an exception.
    NotAuthorized,
    /// A record could not be decoded into the requested shape.
    MalformedRecord,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidReference => "invalid reference",
            ErrorKind::TransportFailure => "could not load",
            ErrorKind::NotAuthorized => "not authorized",
            ErrorKind::MalformedRecord => "malformed record",
        };
        f.write_str(s)
    }
}

/// Result type for livebind operations.
pub type Result<T> = std::result::Result<T, BindError>;
