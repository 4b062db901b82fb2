//! Traffic router — pushes routing selectors to the orchestrator.
//!
//! The router refuses to send any selector whose weights don't sum to
//! 100, so a caller bug can never reach the live routing layer. Selector
//! pushes are retried under the configured policy; if the write still
//! cannot be confirmed, the router re-reads live state before reporting
//! failure — an acknowledgement lost on the wire must not fail an
//! update that actually landed.
//!
//! Blue/green atomicity is two-phase by construction: the controller
//! converges the new pool to fully ready under the health gate first,
//! so the single selector update pushed here is the only externally
//! visible change.

use tracing::{info, warn};

use switchyard_orch::{with_retry, OrchestrationClient, RetryPolicy};
use switchyard_state::RoutingSelector;

use crate::error::{RolloutError, RolloutResult};

/// Applies routing selectors with retry and read-back confirmation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrafficRouter {
    pub retry: RetryPolicy,
}

impl TrafficRouter {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Push the desired selector as a single update.
    pub async fn apply(
        &self,
        client: &dyn OrchestrationClient,
        selector: &RoutingSelector,
    ) -> RolloutResult<()> {
        let total = selector.total_weight();
        if total != 100 {
            return Err(RolloutError::InvariantViolation(format!(
                "selector for {} sums to {total}, expected 100",
                selector.service
            )));
        }

        let push = with_retry(&self.retry, "set_routing_selector", || {
            client.set_routing_selector(&selector.service, &selector.weights)
        })
        .await;

        match push {
            Ok(()) => {
                info!(service = %selector.service, weights = ?selector.weights, "selector applied");
                Ok(())
            }
            Err(err) => {
                // The write may have landed even though the ack didn't.
                match client.get_routing_selector(&selector.service).await {
                    Ok(Some(live)) if live == selector.weights => {
                        warn!(
                            service = %selector.service,
                            "selector write unconfirmed but live state matches; accepting"
                        );
                        Ok(())
                    }
                    _ => Err(RolloutError::Orch(err)),
                }
            }
        }
    }
}
