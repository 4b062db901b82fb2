//! Error types for orchestration client operations.

use thiserror::Error;

/// Result type alias for orchestration client operations.
pub type OrchResult<T> = Result<T, OrchError>;

/// Errors returned by an orchestration client.
#[derive(Debug, Clone, Error)]
pub enum OrchError {
    /// Transient failure reaching the orchestration API. Retryable.
    #[error("orchestration API unavailable: {0}")]
    Unavailable(String),

    /// The named pool does not exist.
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    /// The orchestration API rejected the request as invalid.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl OrchError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
