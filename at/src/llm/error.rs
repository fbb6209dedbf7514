//! Generation errors

use std::time::Duration;
use thiserror::Error;

/// Why a generation call produced no text
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("backend asked to slow down (retry after {}s)", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("backend answered {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("could not reach backend: {0}")]
    Network(#[from] reqwest::Error),

    #[error("backend reply not understood: {0}")]
    InvalidResponse(String),

    #[error("backend misconfigured: {0}")]
    Config(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether sending the same request again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::ApiError { status, .. } => *status == 408 || *status >= 500,
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::InvalidResponse(_) | Self::Config(_) | Self::Json(_) => false,
        }
    }
}
