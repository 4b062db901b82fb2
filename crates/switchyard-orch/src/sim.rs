//! SimCluster — an in-memory orchestration backend.
//!
//! Used two ways: as the test double for controller and rollout tests
//! (manual readiness control, fault injection) and as the backend for
//! local CLI operation (optionally persisted to a JSON file so pool
//! state survives between invocations).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{OrchestrationClient, PoolStatus};
use crate::error::{OrchError, OrchResult};

/// A pool as the simulated cluster sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimPool {
    pub image: String,
    pub replicas: u32,
    pub ready_replicas: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SimState {
    pools: HashMap<String, SimPool>,
    selectors: HashMap<String, Vec<(String, u8)>>,
    /// When set, pools report ready immediately after scaling.
    auto_ready: bool,
    /// Calls left to fail with `Unavailable` (fault injection; not persisted).
    #[serde(skip)]
    fail_budget: u32,
}

/// Simulated orchestration cluster.
#[derive(Clone)]
pub struct SimCluster {
    inner: Arc<RwLock<SimState>>,
    /// When set, state is flushed here after every mutation.
    path: Option<PathBuf>,
}

impl SimCluster {
    /// Create a cluster where pools become ready as soon as they scale.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SimState {
                auto_ready: true,
                ..SimState::default()
            })),
            path: None,
        }
    }

    /// Create a cluster where readiness is driven manually via
    /// [`SimCluster::set_ready`] (for gate-timeout tests).
    pub fn with_manual_readiness() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SimState::default())),
            path: None,
        }
    }

    /// Open a file-backed cluster, loading existing state if present.
    pub fn open(path: &Path) -> OrchResult<Self> {
        let state = if path.exists() {
            let bytes = std::fs::read(path)
                .map_err(|e| OrchError::Unavailable(format!("read {}: {e}", path.display())))?;
            let mut state: SimState = serde_json::from_slice(&bytes)
                .map_err(|e| OrchError::Unavailable(format!("parse {}: {e}", path.display())))?;
            state.auto_ready = true;
            state
        } else {
            SimState {
                auto_ready: true,
                ..SimState::default()
            }
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(state)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Fail the next `n` client calls with `OrchError::Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.inner.write().expect("sim lock").fail_budget = n;
    }

    /// Set the ready replica count of a pool (manual-readiness mode).
    pub fn set_ready(&self, pool: &str, ready: u32) {
        let mut state = self.inner.write().expect("sim lock");
        if let Some(p) = state.pools.get_mut(pool) {
            p.ready_replicas = ready.min(p.replicas);
        }
    }

    /// Snapshot a pool for test assertions.
    pub fn pool(&self, name: &str) -> Option<SimPool> {
        self.inner.read().expect("sim lock").pools.get(name).cloned()
    }

    /// Snapshot a service's selector for test assertions.
    pub fn selector(&self, service: &str) -> Option<Vec<(String, u8)>> {
        self.inner
            .read()
            .expect("sim lock")
            .selectors
            .get(service)
            .cloned()
    }

    /// Consume one unit of the fault budget, failing the call if any is left.
    fn take_fault(&self, op: &str) -> OrchResult<()> {
        let mut state = self.inner.write().expect("sim lock");
        if state.fail_budget > 0 {
            state.fail_budget -= 1;
            return Err(OrchError::Unavailable(format!("injected fault during {op}")));
        }
        Ok(())
    }

    /// Flush state to the backing file, if one is configured.
    fn flush(&self) -> OrchResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = {
            let state = self.inner.read().expect("sim lock");
            serde_json::to_vec_pretty(&*state)
                .map_err(|e| OrchError::Unavailable(format!("serialize cluster state: {e}")))?
        };
        std::fs::write(path, bytes)
            .map_err(|e| OrchError::Unavailable(format!("write {}: {e}", path.display())))?;
        Ok(())
    }
}

impl Default for SimCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrchestrationClient for SimCluster {
    async fn create_or_update_pool(
        &self,
        name: &str,
        image: &str,
        replicas: u32,
    ) -> OrchResult<()> {
        self.take_fault("create_or_update_pool")?;
        {
            let mut state = self.inner.write().expect("sim lock");
            let auto_ready = state.auto_ready;
            let pool = state.pools.entry(name.to_string()).or_insert(SimPool {
                image: image.to_string(),
                replicas: 0,
                ready_replicas: 0,
            });
            pool.image = image.to_string();
            pool.replicas = replicas;
            if auto_ready {
                pool.ready_replicas = replicas;
            } else {
                // Scaling down can't leave more ready than desired.
                pool.ready_replicas = pool.ready_replicas.min(replicas);
            }
            debug!(%name, %image, replicas, "sim pool converged");
        }
        self.flush()
    }

    async fn get_pool_status(&self, name: &str) -> OrchResult<PoolStatus> {
        self.take_fault("get_pool_status")?;
        let state = self.inner.read().expect("sim lock");
        let pool = state
            .pools
            .get(name)
            .ok_or_else(|| OrchError::PoolNotFound(name.to_string()))?;
        Ok(PoolStatus {
            replicas: pool.replicas,
            ready_replicas: pool.ready_replicas,
        })
    }

    async fn delete_pool(&self, name: &str) -> OrchResult<()> {
        self.take_fault("delete_pool")?;
        {
            let mut state = self.inner.write().expect("sim lock");
            let existed = state.pools.remove(name).is_some();
            debug!(%name, existed, "sim pool deleted");
        }
        self.flush()
    }

    async fn set_routing_selector(
        &self,
        service: &str,
        weights: &[(String, u8)],
    ) -> OrchResult<()> {
        self.take_fault("set_routing_selector")?;
        {
            let mut state = self.inner.write().expect("sim lock");
            state
                .selectors
                .insert(service.to_string(), weights.to_vec());
            debug!(%service, ?weights, "sim selector updated");
        }
        self.flush()
    }

    async fn get_routing_selector(&self, service: &str) -> OrchResult<Option<Vec<(String, u8)>>> {
        self.take_fault("get_routing_selector")?;
        let state = self.inner.read().expect("sim lock");
        Ok(state.selectors.get(service).cloned())
    }
}
