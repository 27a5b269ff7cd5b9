//! Login redirect errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failures that stop a login redirect.
///
/// These surface to the caller as a failed request; there is no valid
/// destination to redirect to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("Companion API unreachable: {0}")]
    Transport(String),

    #[error("Companion API returned {status}")]
    Upstream { status: u16 },

    #[error("Companion API returned an invalid session: {0}")]
    InvalidResponse(String),

    #[error("Failed to serialize user: {0}")]
    User(String),

    #[error("Failed to sign session token: {0}")]
    Token(String),
}

impl LoginError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LoginError::Transport(_)
            | LoginError::Upstream { .. }
            | LoginError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            LoginError::User(_) | LoginError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            LoginError::Transport(_) | LoginError::Upstream { .. } => "companion_unavailable",
            LoginError::InvalidResponse(_) => "companion_invalid_response",
            LoginError::User(_) | LoginError::Token(_) => "token_error",
        }
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Login redirect failed");
        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}
