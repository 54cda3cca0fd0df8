pub mod auth;
pub mod models;
pub mod payment;
pub mod pii;
pub mod repository;
pub mod retry;
pub mod shipping;

pub use auth::AuthContext;
pub use pii::Masked;
pub use retry::{retry, retry_unsent, ExponentialBackoff, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Failure talking to an external provider (payment gateway, shipping aggregator).
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The connection failed before any request bytes reached the provider.
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Unauthorized by provider: {0}")]
    Unauthorized(String),
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("Rejected by provider: {0}")]
    Rejected(String),
    #[error("No auth token available: {0}")]
    NoToken(String),
}

impl GatewayError {
    /// Transient failures that are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Connect(_) | GatewayError::Network(_) => true,
            GatewayError::Http { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            _ => false,
        }
    }

    /// Failures after which the provider cannot have acted on the request.
    /// Calls that create records at the provider are only repeated on these.
    pub fn is_unsent(&self) -> bool {
        matches!(
            self,
            GatewayError::Connect(_) | GatewayError::Http { status: 429, .. }
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::Network("reset".into()).is_retryable());
        assert!(GatewayError::Http { status: 503, message: String::new() }.is_retryable());
        assert!(GatewayError::Http { status: 429, message: String::new() }.is_retryable());
        assert!(!GatewayError::Http { status: 422, message: String::new() }.is_retryable());
        assert!(!GatewayError::Unauthorized("expired".into()).is_retryable());
        assert!(!GatewayError::Rejected("no courier".into()).is_retryable());
    }

    #[test]
    fn test_only_unsent_failures_are_safe_to_resend() {
        assert!(GatewayError::Connect("refused".into()).is_unsent());
        assert!(GatewayError::Http { status: 429, message: String::new() }.is_unsent());
        assert!(!GatewayError::Network("timed out".into()).is_unsent());
        assert!(!GatewayError::Http { status: 504, message: String::new() }.is_unsent());
        assert!(!GatewayError::Http { status: 408, message: String::new() }.is_unsent());
    }
}
