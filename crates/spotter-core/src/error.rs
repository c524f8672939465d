//! Error taxonomy for resource fetches.
//!
//! `TransportError` is what the transport collaborator reports for a single
//! attempt. `FetchError` is what a caller of the cache eventually sees.

use std::time::Duration;

use thiserror::Error;

/// A single transport attempt failed. Always retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),
}

impl TransportError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        TransportError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        TransportError::Network(message.into())
    }

    /// HTTP-like status, if the failure came back from the server.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            TransportError::Network(_) => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Request aborted")]
    Aborted,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Giving up after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        last: TransportError,
    },

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Timed out after {0:?} waiting for an in-flight fetch")]
    JoinTimeout(Duration),
}

impl FetchError {
    /// Only raw transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, FetchError::Aborted)
    }
}
