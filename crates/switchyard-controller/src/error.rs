//! Controller error types.

use thiserror::Error;

use switchyard_rollout::RolloutError;
use switchyard_state::StateError;

/// Result type alias for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors surfaced by the controller verb surface.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("deployment not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An in-flight deploy/shift was cancelled by a higher-priority
    /// rollback.
    #[error("operation on {0} preempted by rollback")]
    Preempted(String),

    #[error(transparent)]
    Rollout(#[from] RolloutError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl ControllerError {
    /// Process exit code for the CLI surface.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Rollout(RolloutError::IllegalTransition { .. }) => 2,
            Self::Rollout(RolloutError::HealthCheckTimeout { .. }) => 3,
            Self::Rollout(RolloutError::Orch(_)) => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_orch::OrchError;
    use switchyard_state::DeployState;

    #[test]
    fn exit_codes_match_the_command_contract() {
        let illegal = ControllerError::Rollout(RolloutError::illegal(
            "promote",
            DeployState::Stable,
            "expected shifting",
        ));
        assert_eq!(illegal.exit_code(), 2);

        let timeout = ControllerError::Rollout(RolloutError::HealthCheckTimeout {
            pool: "api-g2".to_string(),
            waited_ms: 30_000,
        });
        assert_eq!(timeout.exit_code(), 3);

        let unavailable = ControllerError::Rollout(RolloutError::Orch(OrchError::Unavailable(
            "connection refused".to_string(),
        )));
        assert_eq!(unavailable.exit_code(), 4);

        assert_eq!(ControllerError::NotFound("x".to_string()).exit_code(), 1);
    }
}
