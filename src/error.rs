//! Error types for the gatehouse crate.

use thiserror::Error;

/// Main error type for gatekeeper construction and configuration.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;

/// Failure classes for remote authority calls.
///
/// These are logged at the fetch/report boundary and converted into
/// decision-level outcomes; they are never surfaced to callers of the
/// gatekeeper directly.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Failed to reach the authority at all
    #[error("Failed to connect to the rate limit authority: {0}")]
    Connection(#[source] reqwest::Error),

    /// The request exceeded the configured timeout
    #[error("Request to the rate limit authority timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// The authority answered with a non-success status
    #[error("Rate limit authority returned HTTP {0}")]
    Status(reqwest::StatusCode),

    /// The response body could not be decoded
    #[error("Failed to decode the rate limit authority response: {0}")]
    Decode(#[source] reqwest::Error),
}
