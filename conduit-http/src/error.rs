//! Request execution error types.

use crate::ServerError;
use std::time::Duration;
use thiserror::Error;

/// Result type for request execution.
pub type Result<T> = std::result::Result<T, RequestError>;

/// Message used when the engine fails without saying why.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Request execution errors.
///
/// The soft "no result" cases (attempts exhausted, duplicate in flight,
/// cancelled) are not errors; they are reported through
/// [`Outcome`](crate::Outcome).
#[derive(Debug, Error)]
pub enum RequestError {
    /// The engine reported a transport failure.
    #[error("Network error: {message}")]
    Network {
        /// Engine-supplied message.
        message: String,
        /// HTTP status, when the failure was status-driven.
        status: Option<u16>,
    },

    /// The response carried an application error envelope.
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// The request's own parse function rejected the body.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The engine refused to start the transfer.
    #[error("Engine rejected request: {0}")]
    Engine(String),

    /// The request did not finish before its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl RequestError {
    /// Transport failure with a message and no status.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    /// Parse failure with a message.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Check if this is a transport failure.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Check if this is a server-reported error.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    /// Check if this is a parse failure.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The decoded server error, if any.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(error) => Some(error),
            _ => None,
        }
    }

    /// Status code from the server envelope or the transport, if known.
    pub fn status_code(&self) -> Option<i64> {
        match self {
            Self::Server(error) => Some(error.status),
            Self::Network { status, .. } => status.map(i64::from),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}
