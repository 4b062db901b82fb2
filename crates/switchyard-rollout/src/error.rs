//! Rollout error taxonomy.
//!
//! `IllegalTransition` is never retried and surfaces to the caller.
//! `HealthCheckTimeout` triggers the defined fallback transition
//! (auto-rollback for deploy, hold-at-last-good for shift).
//! `Orch` failures are retried with bounded backoff before they land
//! here. `InvariantViolation` means a controller bug, not an
//! environmental problem, and is always fatal.

use thiserror::Error;

use switchyard_orch::OrchError;
use switchyard_state::DeployState;

/// Result type alias for rollout operations.
pub type RolloutResult<T> = Result<T, RolloutError>;

/// Errors produced by the rollout engine.
#[derive(Debug, Error)]
pub enum RolloutError {
    /// The requested verb is not valid from the current state.
    #[error("illegal transition: {verb} not valid from state {state}: {reason}")]
    IllegalTransition {
        verb: String,
        state: DeployState,
        reason: String,
    },

    /// A pool did not reach readiness within the caller's deadline.
    #[error("health check timed out: pool {pool} not ready within {waited_ms}ms")]
    HealthCheckTimeout { pool: String, waited_ms: u64 },

    /// Internal defensive check failed — a controller bug.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Orchestration API failure that survived the retry budget.
    #[error("orchestration error: {0}")]
    Orch(#[from] OrchError),
}

impl RolloutError {
    /// Build an `IllegalTransition` for a verb attempted from `state`.
    pub fn illegal(verb: &str, state: DeployState, reason: &str) -> Self {
        Self::IllegalTransition {
            verb: verb.to_string(),
            state,
            reason: reason.to_string(),
        }
    }
}
