//! Health gate — deadline-bounded readiness polling.
//!
//! Decides whether a pool is eligible to receive traffic by polling the
//! orchestrator for `ready_replicas == replicas`. The gate never blocks
//! forever: it carries a deadline and reports `TimedOut` when it
//! expires, letting the controller choose rollback over deadlock.
//! Transient orchestration failures during polling are tolerated until
//! the deadline.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use switchyard_orch::{OrchError, OrchestrationClient};

/// Typed outcome of waiting on the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Every desired replica reported ready before the deadline.
    Healthy,
    /// The pool cannot become ready (it does not exist).
    Unhealthy,
    /// The deadline expired before the pool converged.
    TimedOut,
}

/// Readiness gate with a poll interval and an overall deadline.
#[derive(Debug, Clone, Copy)]
pub struct HealthGate {
    /// Overall deadline for one wait.
    pub timeout: Duration,
    /// Delay between readiness polls.
    pub poll_interval: Duration,
}

impl Default for HealthGate {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl HealthGate {
    /// Wait until `pool` reports all replicas ready, the pool turns out
    /// not to exist, or the deadline expires.
    pub async fn wait_ready(&self, client: &dyn OrchestrationClient, pool: &str) -> GateOutcome {
        let deadline = Instant::now() + self.timeout;

        loop {
            match client.get_pool_status(pool).await {
                Ok(status) if status.is_ready() => {
                    debug!(%pool, replicas = status.replicas, "gate passed");
                    return GateOutcome::Healthy;
                }
                Ok(status) => {
                    debug!(
                        %pool,
                        ready = status.ready_replicas,
                        desired = status.replicas,
                        "pool not ready yet"
                    );
                }
                Err(OrchError::PoolNotFound(_)) => {
                    warn!(%pool, "gate found no such pool");
                    return GateOutcome::Unhealthy;
                }
                Err(err) => {
                    // Transient; keep polling until the deadline.
                    debug!(%pool, error = %err, "gate poll failed, will retry");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(%pool, timeout_ms = self.timeout.as_millis() as u64, "gate timed out");
                return GateOutcome::TimedOut;
            }
            let remaining = deadline - now;
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}
