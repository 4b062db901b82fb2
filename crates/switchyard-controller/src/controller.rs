//! Controller — the verb surface over one or more managed deployments.
//!
//! The `Controller` serializes operations per deployment (a mutex per
//! name), lets `status` read a snapshot without touching that mutex,
//! and treats `rollback` as a higher-priority interrupt: it raises a
//! cancel signal before queueing for the mutex, so an in-flight
//! `deploy`/`shift` aborts at its next suspension point instead of
//! finishing. Every verb is idempotent under retry: the record is
//! persisted at each transition boundary, and re-issuing a verb
//! converges to the same end state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use switchyard_orch::{with_retry, OrchError, OrchestrationClient, PoolStatus};
use switchyard_rollout::machine::{self, DeployDecision, InitDecision};
use switchyard_rollout::{GateOutcome, HealthGate, RolloutError, TrafficRouter};
use switchyard_state::{DeployState, Deployment, Pool, StateStore, Strategy};

use crate::config::ControllerConfig;
use crate::error::{ControllerError, ControllerResult};

/// Per-deployment synchronization: the operation mutex and the rollback
/// preemption signal.
struct Slot {
    op: Mutex<()>,
    cancel: watch::Sender<bool>,
}

impl Slot {
    fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            op: Mutex::new(()),
            cancel,
        }
    }
}

/// The progressive-delivery controller.
pub struct Controller {
    state: StateStore,
    client: Arc<dyn OrchestrationClient>,
    config: ControllerConfig,
    gate: HealthGate,
    router: TrafficRouter,
    /// Active slots: deployment name → serialization state.
    slots: Arc<RwLock<HashMap<String, Arc<Slot>>>>,
}

impl Controller {
    /// Create a controller over a state store and an orchestration client.
    pub fn new(
        state: StateStore,
        client: Arc<dyn OrchestrationClient>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            state,
            client,
            gate: HealthGate {
                timeout: config.gate_timeout,
                poll_interval: config.gate_poll_interval,
            },
            router: TrafficRouter::new(config.retry),
            config,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // ── verbs ──────────────────────────────────────────────────────

    /// `init` — provision the stable pool at full capacity and route
    /// 100% of traffic to it. Idempotent for a repeated image.
    pub async fn init(
        &self,
        name: &str,
        strategy: Strategy,
        image: &str,
        total_capacity: u32,
    ) -> ControllerResult<()> {
        if total_capacity == 0 {
            return Err(ControllerError::InvalidArgument(
                "total capacity must be at least 1".to_string(),
            ));
        }

        let slot = self.slot(name).await;
        let _guard = slot.op.lock().await;

        let now = epoch_secs();
        let mut d = match self.state.get(name)? {
            Some(existing) => {
                if existing.strategy != strategy || existing.total_capacity != total_capacity {
                    warn!(
                        deployment = %name,
                        "init arguments differ from the existing record; record wins"
                    );
                }
                existing
            }
            None => Deployment::new(name, strategy, total_capacity, now),
        };

        match machine::init(&mut d, image, now)? {
            InitDecision::Created { pool } => {
                // Persist first: a crash mid-provisioning leaves a record
                // that reconciliation can converge the cluster toward.
                self.state.put(&d)?;
                self.scale_pool(&pool, image, d.total_capacity).await?;
                self.apply_selector(&d).await?;
            }
            InitDecision::AlreadyInitialized => {
                debug!(deployment = %name, "already initialized; converging");
                let stable = require_stable(&d)?;
                self.scale_pool(&stable.name, &stable.image, stable.replicas)
                    .await?;
                self.apply_selector(&d).await?;
            }
        }
        Ok(())
    }

    /// `deploy` — provision a candidate pool for the new image, wait on
    /// the health gate, then open its initial traffic share. A gate
    /// failure rolls the candidate back to zero automatically.
    pub async fn deploy(&self, name: &str, image: &str, initial_weight: u8) -> ControllerResult<()> {
        let slot = self.slot(name).await;
        let _guard = slot.op.lock().await;
        slot.cancel.send_replace(false);
        let mut cancel_rx = slot.cancel.subscribe();

        let mut d = self.load(name)?;
        // A candidate left by an earlier rollback would be orphaned once
        // the record points at the new one; reclaim it first.
        let stale_candidate = (d.state == DeployState::Stable)
            .then(|| d.candidate_pool.clone())
            .flatten();

        let now = epoch_secs();
        let plan = match machine::begin_deploy(&mut d, image, initial_weight, now)? {
            DeployDecision::Started(plan) => {
                self.state.put(&d)?;
                if let Some(stale) = stale_candidate {
                    if let Err(err) = self.delete_pool(&stale.name).await {
                        warn!(deployment = %name, pool = %stale.name, error = %err,
                            "failed to reclaim stale candidate pool");
                    }
                }
                plan
            }
            DeployDecision::AlreadyInFlight(plan) => {
                if d.state == DeployState::Shifting {
                    // Earlier deploy of this image already completed.
                    debug!(deployment = %name, %image, "deploy already applied");
                    return Ok(());
                }
                plan
            }
        };

        // Grow the candidate before shrinking stable so serving
        // capacity never dips below the target split.
        let effects = async {
            self.scale_pool(&plan.candidate_pool, &plan.candidate_image, plan.candidate_replicas)
                .await?;
            self.scale_pool(&plan.stable_pool, &plan.stable_image, plan.stable_replicas)
                .await
        };
        if let Err(err) = effects.await {
            self.abort_deploy_effects(&mut d, "orchestration unavailable")
                .await;
            return Err(err);
        }

        match self.wait_gate(name, &plan.candidate_pool, &mut cancel_rx).await? {
            GateOutcome::Healthy => {}
            outcome => {
                self.abort_deploy_effects(&mut d, &format!("health gate {outcome:?}"))
                    .await;
                return Err(self.gate_failure(&plan.candidate_pool));
            }
        }

        machine::confirm_deploy(&mut d, initial_weight, epoch_secs())?;
        self.apply_selector(&d).await?;
        machine::check_invariants(&d)?;
        self.state.put(&d)?;
        info!(deployment = %name, %image, weight = d.candidate_weight, "deploy complete");
        Ok(())
    }

    /// `shift` — move the canary to a new traffic weight. The weight
    /// walk must stay monotonic within one rollout; a gate failure
    /// holds the rollout at its last known-good weight.
    pub async fn shift(&self, name: &str, new_weight: u8) -> ControllerResult<()> {
        let slot = self.slot(name).await;
        let _guard = slot.op.lock().await;
        slot.cancel.send_replace(false);
        let mut cancel_rx = slot.cancel.subscribe();

        let mut d = self.load(name)?;
        let Some(plan) = machine::plan_shift(&d, new_weight)? else {
            debug!(deployment = %name, weight = new_weight, "shift is a no-op");
            return Ok(());
        };
        let stable = require_stable(&d)?;
        let candidate = require_candidate(&d)?;

        // Grow the receiving pool first; gate it at its new size before
        // any traffic or capacity moves away from the other pool.
        let (grow, shrink) = match plan.direction {
            switchyard_state::ShiftDirection::Up => (
                (candidate.clone(), plan.split.candidate),
                (stable.clone(), plan.split.stable),
            ),
            switchyard_state::ShiftDirection::Down => (
                (stable.clone(), plan.split.stable),
                (candidate.clone(), plan.split.candidate),
            ),
        };

        self.scale_pool(&grow.0.name, &grow.0.image, grow.1).await?;
        match self.wait_gate(name, &grow.0.name, &mut cancel_rx).await? {
            GateOutcome::Healthy => {}
            outcome => {
                warn!(
                    deployment = %name,
                    pool = %grow.0.name,
                    ?outcome,
                    held_weight = plan.from_weight,
                    "shift aborted; holding last known-good weight"
                );
                // Best-effort revert of the grown pool.
                if let Err(err) = self
                    .scale_pool(&grow.0.name, &grow.0.image, grow.0.replicas)
                    .await
                {
                    warn!(deployment = %name, error = %err, "failed to revert aborted shift");
                }
                return Err(self.gate_failure(&grow.0.name));
            }
        }

        machine::commit_shift(&mut d, &plan, epoch_secs());
        self.apply_selector(&d).await?;
        self.scale_pool(&shrink.0.name, &shrink.0.image, shrink.1)
            .await?;
        machine::check_invariants(&d)?;
        self.state.put(&d)?;
        Ok(())
    }

    /// `promote` — converge the candidate to full capacity, flip the
    /// selector in a single update, retire the old stable pool, and
    /// relabel the candidate as the new stable.
    pub async fn promote(&self, name: &str) -> ControllerResult<()> {
        let slot = self.slot(name).await;
        let _guard = slot.op.lock().await;

        let mut d = self.load(name)?;
        let now = epoch_secs();
        if d.state != DeployState::Promoting {
            machine::begin_promote(&mut d, now)?;
            self.state.put(&d)?;
        }
        let candidate = require_candidate(&d)?;

        // Two-phase: the candidate must be fully ready at full capacity
        // before the flip, so the flip is the only visible change.
        self.scale_pool(&candidate.name, &candidate.image, d.total_capacity)
            .await?;
        let outcome = self.gate.wait_ready(self.client.as_ref(), &candidate.name).await;
        if outcome != GateOutcome::Healthy {
            machine::abort_promote(&mut d, &format!("health gate {outcome:?}"), epoch_secs());
            if let Err(err) = self
                .scale_pool(&candidate.name, &candidate.image, candidate.replicas)
                .await
            {
                warn!(deployment = %name, error = %err, "failed to revert aborted promote");
            }
            self.state.put(&d)?;
            return Err(self.gate_failure(&candidate.name));
        }

        let retired = machine::finish_promote(&mut d, epoch_secs())?;
        // The flip: one selector update, new stable at 100.
        self.apply_selector(&d).await?;
        self.delete_pool(&retired).await?;
        machine::check_invariants(&d)?;
        self.state.put(&d)?;
        info!(deployment = %name, %retired, "promote complete");
        Ok(())
    }

    /// `rollback` — immediately restore stable at 100% traffic. Takes
    /// priority over any in-flight deploy/shift, which it preempts.
    /// The candidate pool stays allocated for inspection.
    pub async fn rollback(&self, name: &str) -> ControllerResult<()> {
        let slot = self.slot(name).await;
        // Raise the interrupt before queueing: an in-flight deploy or
        // shift aborts at its next suspension point.
        slot.cancel.send_replace(true);
        let _guard = slot.op.lock().await;
        slot.cancel.send_replace(false);

        let mut d = self.load(name)?;
        let now = epoch_secs();
        if d.state != DeployState::RollingBack {
            machine::begin_rollback(&mut d, now)?;
            self.state.put(&d)?;
        }
        machine::finish_rollback(&mut d, epoch_secs());

        // Traffic safety first: point the selector back at stable
        // before restoring capacity.
        self.apply_selector(&d).await?;
        let stable = require_stable(&d)?;
        self.scale_pool(&stable.name, &stable.image, d.total_capacity)
            .await?;
        machine::check_invariants(&d)?;
        self.state.put(&d)?;
        info!(deployment = %name, "rollback complete");
        Ok(())
    }

    /// `cleanup` — delete the non-serving candidate pool left behind by
    /// a rollback. Legal only from `Stable`.
    pub async fn cleanup(&self, name: &str) -> ControllerResult<()> {
        let slot = self.slot(name).await;
        let _guard = slot.op.lock().await;

        let mut d = self.load(name)?;
        let Some(pool) = machine::cleanup(&mut d, epoch_secs())? else {
            debug!(deployment = %name, "nothing to clean up");
            return Ok(());
        };
        self.delete_pool(&pool).await?;
        self.state.put(&d)?;
        Ok(())
    }

    /// `destroy` — delete both pools and the deployment record.
    pub async fn destroy(&self, name: &str) -> ControllerResult<()> {
        let slot = self.slot(name).await;
        let _guard = slot.op.lock().await;

        let d = self.load(name)?;
        for pool in [&d.stable_pool, &d.candidate_pool].into_iter().flatten() {
            self.delete_pool(&pool.name).await?;
        }
        self.state.delete(name)?;
        drop(_guard);
        self.slots.write().await.remove(name);
        info!(deployment = %name, "deployment destroyed");
        Ok(())
    }

    /// `status` — snapshot of the full deployment record. Reads the
    /// store directly and never waits on the operation mutex.
    pub fn status(&self, name: &str) -> ControllerResult<Deployment> {
        self.load(name)
    }

    /// List all managed deployments.
    pub fn list(&self) -> ControllerResult<Vec<Deployment>> {
        Ok(self.state.list()?)
    }

    // ── startup reconciliation ─────────────────────────────────────

    /// Reload persisted records and converge the live cluster toward
    /// them. Records stuck in a transitional state are driven back to
    /// `Stable`; replica counts that drifted are re-scaled to the
    /// record. Returns the number of records that needed recovery.
    pub async fn reconcile(&self) -> ControllerResult<u32> {
        let mut recovered = 0u32;
        for mut d in self.state.list()? {
            let slot = self.slot(&d.name).await;
            let _guard = slot.op.lock().await;

            if let Some(action) = machine::recover(&mut d, epoch_secs()) {
                info!(deployment = %d.name, ?action, "recovered interrupted transition");
                recovered += 1;
            }
            if d.state == DeployState::Uninitialized {
                continue;
            }

            for pool in [d.stable_pool.clone(), d.candidate_pool.clone()]
                .into_iter()
                .flatten()
            {
                match self.pool_status(&pool.name).await {
                    Ok(status) if status.replicas == pool.replicas => {}
                    Ok(status) => {
                        warn!(
                            deployment = %d.name,
                            pool = %pool.name,
                            live = status.replicas,
                            recorded = pool.replicas,
                            "replica drift; re-scaling to record"
                        );
                        self.scale_pool(&pool.name, &pool.image, pool.replicas).await?;
                    }
                    Err(ControllerError::Rollout(RolloutError::Orch(
                        OrchError::PoolNotFound(_),
                    ))) => {
                        warn!(deployment = %d.name, pool = %pool.name, "pool missing; re-creating");
                        self.scale_pool(&pool.name, &pool.image, pool.replicas).await?;
                    }
                    Err(err) => return Err(err),
                }
            }
            self.apply_selector(&d).await?;
            machine::check_invariants(&d)?;
            self.state.put(&d)?;
        }
        Ok(recovered)
    }

    // ── internals ──────────────────────────────────────────────────

    /// Get or create the serialization slot for a deployment.
    async fn slot(&self, name: &str) -> Arc<Slot> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(name) {
                return slot.clone();
            }
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone()
    }

    fn load(&self, name: &str) -> ControllerResult<Deployment> {
        self.state
            .get(name)?
            .ok_or_else(|| ControllerError::NotFound(name.to_string()))
    }

    async fn scale_pool(&self, pool: &str, image: &str, replicas: u32) -> ControllerResult<()> {
        with_retry(&self.config.retry, "create_or_update_pool", || {
            self.client.create_or_update_pool(pool, image, replicas)
        })
        .await
        .map_err(RolloutError::Orch)?;
        Ok(())
    }

    async fn delete_pool(&self, pool: &str) -> ControllerResult<()> {
        with_retry(&self.config.retry, "delete_pool", || {
            self.client.delete_pool(pool)
        })
        .await
        .map_err(RolloutError::Orch)?;
        Ok(())
    }

    async fn pool_status(&self, pool: &str) -> ControllerResult<PoolStatus> {
        let status = with_retry(&self.config.retry, "get_pool_status", || {
            self.client.get_pool_status(pool)
        })
        .await
        .map_err(RolloutError::Orch)?;
        Ok(status)
    }

    async fn apply_selector(&self, d: &Deployment) -> ControllerResult<()> {
        self.router
            .apply(self.client.as_ref(), &d.selector())
            .await?;
        Ok(())
    }

    /// Wait on the health gate, aborting early if a rollback raises the
    /// cancel signal.
    async fn wait_gate(
        &self,
        deployment: &str,
        pool: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> ControllerResult<GateOutcome> {
        if *cancel.borrow() {
            return Err(ControllerError::Preempted(deployment.to_string()));
        }
        let gate_wait = self.gate.wait_ready(self.client.as_ref(), pool);
        tokio::pin!(gate_wait);
        loop {
            tokio::select! {
                outcome = &mut gate_wait => return Ok(outcome),
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!(%deployment, %pool, "gate wait preempted by rollback");
                        return Err(ControllerError::Preempted(deployment.to_string()));
                    }
                }
            }
        }
    }

    fn gate_failure(&self, pool: &str) -> ControllerError {
        RolloutError::HealthCheckTimeout {
            pool: pool.to_string(),
            waited_ms: self.config.gate_timeout.as_millis() as u64,
        }
        .into()
    }

    /// Undo a failed deploy: candidate to zero, stable restored, record
    /// back to `Stable`. Cluster effects are best-effort — the record
    /// is authoritative and reconciliation converges stragglers.
    async fn abort_deploy_effects(&self, d: &mut Deployment, reason: &str) {
        machine::abort_deploy(d, reason, epoch_secs());
        if let Some(candidate) = d.candidate_pool.clone() {
            if let Err(err) = self.scale_pool(&candidate.name, &candidate.image, 0).await {
                warn!(deployment = %d.name, error = %err, "failed to scale down aborted candidate");
            }
        }
        if let Some(stable) = d.stable_pool.clone() {
            if let Err(err) = self
                .scale_pool(&stable.name, &stable.image, stable.replicas)
                .await
            {
                warn!(deployment = %d.name, error = %err, "failed to restore stable capacity");
            }
        }
        if let Err(err) = self.state.put(d) {
            warn!(deployment = %d.name, error = %err, "failed to persist aborted deploy");
        }
    }
}

fn require_stable(d: &Deployment) -> ControllerResult<Pool> {
    d.stable_pool.clone().ok_or_else(|| {
        RolloutError::InvariantViolation(format!("{} has no stable pool", d.name)).into()
    })
}

fn require_candidate(d: &Deployment) -> ControllerResult<Pool> {
    d.candidate_pool.clone().ok_or_else(|| {
        RolloutError::InvariantViolation(format!("{} has no candidate pool", d.name)).into()
    })
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
