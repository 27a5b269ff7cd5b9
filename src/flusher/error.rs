//! Flush error types

use thiserror::Error;

/// Why a batch did not reach the telemetry endpoint.
///
/// These never reach the request path; they are handed to the error
/// callback configured on the middleware, if any.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlushError {
    /// Connection, TLS, timeout or body encoding failure.
    #[error("Telemetry transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-2xx status.
    #[error("Telemetry endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The batch was handed off outside a tokio runtime and was dropped.
    #[error("No async runtime available to send telemetry batch")]
    NoRuntime,
}

impl From<reqwest::Error> for FlushError {
    fn from(err: reqwest::Error) -> Self {
        FlushError::Transport(err.to_string())
    }
}
