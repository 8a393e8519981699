//! Error types for data sources.

use thiserror::Error;

/// Errors reported by a data source while fetching or receiving telemetry.
///
/// None of these are fatal: adapters log them, hand them to the
/// `on_error` hook and carry on with the next poll or reconnect.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status.
    #[error("Request failed with status {status} {reason}")]
    Status { status: u16, reason: String },

    /// Failed to parse a response body or message.
    #[error("Failed to parse payload: {0}")]
    Parse(String),

    /// Connection could not be established.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The configured address is not usable.
    #[error("Invalid address: {0}")]
    InvalidUrl(String),

    /// The caller-supplied payload transform failed.
    #[error("Transform failed: {0}")]
    Transform(String),

    /// The caller-supplied message mapper failed.
    #[error("Message mapping failed: {0}")]
    Mapping(String),

    /// Read or write on an open connection failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_connect() {
            SourceError::Connection(err.to_string())
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Http(err.to_string())
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}
