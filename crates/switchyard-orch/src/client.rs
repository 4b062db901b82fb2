//! The `OrchestrationClient` trait — what Switchyard needs from the
//! underlying platform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OrchResult;

/// Live status of a workload pool as reported by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Desired replica count.
    pub replicas: u32,
    /// Replicas currently passing the platform's readiness checks.
    pub ready_replicas: u32,
}

impl PoolStatus {
    /// A pool is ready when every desired replica reports ready.
    pub fn is_ready(&self) -> bool {
        self.ready_replicas == self.replicas
    }
}

/// Operations the underlying orchestration platform must provide.
///
/// Every call is a fallible network operation: callers must assume a
/// request can fail after being partially applied, and re-read status
/// rather than trust an errored call did nothing.
#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    /// Create the pool if absent, otherwise converge it to the given
    /// image and replica count.
    async fn create_or_update_pool(
        &self,
        name: &str,
        image: &str,
        replicas: u32,
    ) -> OrchResult<()>;

    /// Read the live status of a pool.
    async fn get_pool_status(&self, name: &str) -> OrchResult<PoolStatus>;

    /// Delete a pool. Deleting an absent pool is not an error.
    async fn delete_pool(&self, name: &str) -> OrchResult<()>;

    /// Replace the routing selector for a logical service with the
    /// given per-pool weights, as a single update.
    async fn set_routing_selector(
        &self,
        service: &str,
        weights: &[(String, u8)],
    ) -> OrchResult<()>;

    /// Read back the live routing selector for a service, if one is set.
    async fn get_routing_selector(&self, service: &str) -> OrchResult<Option<Vec<(String, u8)>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_status_ready_iff_all_replicas_ready() {
        assert!(PoolStatus { replicas: 3, ready_replicas: 3 }.is_ready());
        assert!(!PoolStatus { replicas: 3, ready_replicas: 2 }.is_ready());
        // Zero-replica pools are vacuously ready.
        assert!(PoolStatus { replicas: 0, ready_replicas: 0 }.is_ready());
    }
}
