use std::time::Duration;

/// Failures surfaced by a model backend.
/// Classified as retryable or terminal so wrappers can decide whether to try again.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    // Terminal
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    // Retryable
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("backend error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    // Operational
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Unavailable(_)
        )
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::MalformedOutput(_) => "malformed_output",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::Unavailable(_) => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}
