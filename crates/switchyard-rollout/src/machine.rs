//! Deployment state machine.
//!
//! The single authority on which transitions are legal. Every function
//! here operates on the persisted [`Deployment`] record: it validates
//! legality, mutates the record, and appends to the history log. Side
//! effects against the cluster are the controller's job; the machine
//! hands it plans (target replica counts, pools to delete) and the
//! controller applies them between `begin_*` and the matching
//! `confirm_*`/`finish_*` call, so a record persisted mid-transition is
//! recoverable on restart.
//!
//! Edges:
//!
//! ```text
//! Uninitialized → Stable → Deploying → Shifting ─┬→ Promoting  → Stable
//!                                                └→ RollingBack → Stable
//! ```

use tracing::{info, warn};

use switchyard_state::{
    DeployState, Deployment, Pool, PoolLabel, ShiftDirection, Strategy,
};

use crate::error::{RolloutError, RolloutResult};
use crate::planner::{split, Split};

// ── init ──────────────────────────────────────────────────────────

/// Outcome of an `init` against the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitDecision {
    /// A fresh stable pool must be provisioned at full capacity.
    Created { pool: String },
    /// Same image, already initialized — nothing to do.
    AlreadyInitialized,
}

/// `Uninitialized → Stable`. Idempotent for a repeated image; a
/// different image on an initialized deployment must go through deploy.
pub fn init(d: &mut Deployment, image: &str, now: u64) -> RolloutResult<InitDecision> {
    match d.state {
        DeployState::Uninitialized => {
            let pool = d.next_pool_name();
            d.generation += 1;
            d.stable_pool = Some(Pool {
                name: pool.clone(),
                label: PoolLabel::Stable,
                image: image.to_string(),
                replicas: d.total_capacity,
            });
            d.candidate_weight = 0;
            d.record_transition(
                DeployState::Uninitialized,
                DeployState::Stable,
                "init",
                format!("image={image}"),
                now,
            );
            info!(deployment = %d.name, %image, %pool, "deployment initialized");
            Ok(InitDecision::Created { pool })
        }
        DeployState::Stable => {
            let stable = d.stable_pool.as_ref().ok_or_else(|| {
                RolloutError::InvariantViolation(format!(
                    "{} is stable with no stable pool",
                    d.name
                ))
            })?;
            if stable.image == image {
                Ok(InitDecision::AlreadyInitialized)
            } else {
                Err(RolloutError::illegal(
                    "init",
                    d.state,
                    "already initialized with a different image; use deploy",
                ))
            }
        }
        state => Err(RolloutError::illegal("init", state, "already initialized")),
    }
}

// ── deploy ────────────────────────────────────────────────────────

/// Outcome of beginning a deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployDecision {
    /// A candidate pool must be provisioned and both pools scaled to
    /// the given targets.
    Started(DeployPlan),
    /// The same image is already in flight — converge, don't duplicate.
    AlreadyInFlight(DeployPlan),
}

/// Target cluster state for a deploy in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPlan {
    pub candidate_pool: String,
    pub candidate_image: String,
    pub candidate_replicas: u32,
    pub stable_pool: String,
    pub stable_image: String,
    pub stable_replicas: u32,
}

/// `Stable → Deploying`. Creates the candidate pool record sized for
/// the initial weight (canary conserves capacity; blue/green provisions
/// a full parallel set). Traffic stays on stable until the gate passes.
pub fn begin_deploy(
    d: &mut Deployment,
    image: &str,
    initial_weight: u8,
    now: u64,
) -> RolloutResult<DeployDecision> {
    // Retry of an in-flight deploy with the same image converges
    // instead of provisioning a second candidate.
    if matches!(d.state, DeployState::Deploying | DeployState::Shifting) {
        if let Some(candidate) = &d.candidate_pool {
            if candidate.image == image {
                let plan = current_plan(d)?;
                return Ok(DeployDecision::AlreadyInFlight(plan));
            }
        }
        return Err(RolloutError::illegal(
            "deploy",
            d.state,
            "another rollout is in flight; rollback or promote first",
        ));
    }

    if d.state != DeployState::Stable {
        return Err(RolloutError::illegal("deploy", d.state, "expected stable"));
    }
    let stable = d.stable_pool.clone().ok_or_else(|| {
        RolloutError::InvariantViolation(format!("{} is stable with no stable pool", d.name))
    })?;
    if stable.image == image {
        return Err(RolloutError::illegal(
            "deploy",
            d.state,
            "image is already the stable version",
        ));
    }

    let weight = initial_weight.min(100);
    let (stable_replicas, candidate_replicas) = match d.strategy {
        Strategy::Canary => {
            let s = split(d.total_capacity, weight);
            (s.stable, s.candidate)
        }
        // Blue/green runs a full parallel set; capacity conservation is
        // a canary-only invariant.
        Strategy::BlueGreen => (d.total_capacity, d.total_capacity),
    };

    let pool = d.next_pool_name();
    d.generation += 1;
    d.candidate_pool = Some(Pool {
        name: pool.clone(),
        label: PoolLabel::Candidate,
        image: image.to_string(),
        replicas: candidate_replicas,
    });
    if let Some(stable_pool) = d.stable_pool.as_mut() {
        stable_pool.replicas = stable_replicas;
    }
    d.shift_direction = None;
    d.record_transition(
        DeployState::Stable,
        DeployState::Deploying,
        "deploy",
        format!("image={image} weight={weight}"),
        now,
    );
    info!(
        deployment = %d.name,
        %image,
        candidate = %pool,
        candidate_replicas,
        stable_replicas,
        "deploy started"
    );

    Ok(DeployDecision::Started(DeployPlan {
        candidate_pool: pool,
        candidate_image: image.to_string(),
        candidate_replicas,
        stable_pool: stable.name,
        stable_image: stable.image,
        stable_replicas,
    }))
}

/// Rebuild the target plan from the record (for idempotent retries).
fn current_plan(d: &Deployment) -> RolloutResult<DeployPlan> {
    let stable = d.stable_pool.as_ref().ok_or_else(|| {
        RolloutError::InvariantViolation(format!("{} has no stable pool", d.name))
    })?;
    let candidate = d.candidate_pool.as_ref().ok_or_else(|| {
        RolloutError::InvariantViolation(format!("{} has no candidate pool", d.name))
    })?;
    Ok(DeployPlan {
        candidate_pool: candidate.name.clone(),
        candidate_image: candidate.image.clone(),
        candidate_replicas: candidate.replicas,
        stable_pool: stable.name.clone(),
        stable_image: stable.image.clone(),
        stable_replicas: stable.replicas,
    })
}

/// `Deploying → Shifting` after the gate passed. The candidate starts
/// receiving its initial traffic share (canary) or stays dark until
/// promote (blue/green).
pub fn confirm_deploy(d: &mut Deployment, initial_weight: u8, now: u64) -> RolloutResult<()> {
    if d.state != DeployState::Deploying {
        return Err(RolloutError::illegal(
            "deploy",
            d.state,
            "gate confirmation outside a deploy",
        ));
    }
    d.candidate_weight = match d.strategy {
        Strategy::Canary => initial_weight.min(100),
        Strategy::BlueGreen => 0,
    };
    d.record_transition(
        DeployState::Deploying,
        DeployState::Shifting,
        "deploy",
        format!("gate=passed weight={}", d.candidate_weight),
        now,
    );
    Ok(())
}

/// `Deploying → Stable` when the gate failed: the candidate is scaled
/// to zero and stable restored to full capacity, automatically.
pub fn abort_deploy(d: &mut Deployment, reason: &str, now: u64) {
    if let Some(candidate) = d.candidate_pool.as_mut() {
        candidate.replicas = 0;
    }
    if let Some(stable) = d.stable_pool.as_mut() {
        stable.replicas = d.total_capacity;
    }
    d.candidate_weight = 0;
    d.shift_direction = None;
    warn!(deployment = %d.name, %reason, "deploy aborted");
    d.record_transition(
        DeployState::Deploying,
        DeployState::Stable,
        "deploy",
        format!("aborted reason={reason}"),
        now,
    );
}

// ── shift ─────────────────────────────────────────────────────────

/// A validated weight change, not yet applied to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftPlan {
    pub from_weight: u8,
    pub to_weight: u8,
    pub direction: ShiftDirection,
    pub split: Split,
}

/// Validate a shift. Returns `None` for a same-weight no-op. Does not
/// mutate the record — commit with [`commit_shift`] once the cluster
/// reflects the plan.
pub fn plan_shift(d: &Deployment, new_weight: u8) -> RolloutResult<Option<ShiftPlan>> {
    if d.strategy == Strategy::BlueGreen {
        return Err(RolloutError::illegal(
            "shift",
            d.state,
            "blue-green moves traffic only via promote",
        ));
    }
    if d.state != DeployState::Shifting {
        return Err(RolloutError::illegal("shift", d.state, "expected shifting"));
    }

    let to_weight = new_weight.min(100);
    let from_weight = d.candidate_weight;
    if to_weight == from_weight {
        return Ok(None);
    }

    let direction = if to_weight > from_weight {
        ShiftDirection::Up
    } else {
        ShiftDirection::Down
    };
    if let Some(locked) = d.shift_direction {
        if locked != direction {
            return Err(RolloutError::illegal(
                "shift",
                d.state,
                "direction reversal within one rollout; rollback first",
            ));
        }
    }

    Ok(Some(ShiftPlan {
        from_weight,
        to_weight,
        direction,
        split: split(d.total_capacity, to_weight),
    }))
}

/// Record a shift the cluster has already converged to.
pub fn commit_shift(d: &mut Deployment, plan: &ShiftPlan, now: u64) {
    if let Some(stable) = d.stable_pool.as_mut() {
        stable.replicas = plan.split.stable;
    }
    if let Some(candidate) = d.candidate_pool.as_mut() {
        candidate.replicas = plan.split.candidate;
    }
    d.candidate_weight = plan.to_weight;
    d.shift_direction = Some(plan.direction);
    info!(
        deployment = %d.name,
        from = plan.from_weight,
        to = plan.to_weight,
        stable = plan.split.stable,
        candidate = plan.split.candidate,
        "shift committed"
    );
    d.record_transition(
        DeployState::Shifting,
        DeployState::Shifting,
        "shift",
        format!("weight={}", plan.to_weight),
        now,
    );
}

// ── promote ───────────────────────────────────────────────────────

/// `Shifting → Promoting`. The controller then converges the candidate
/// to full capacity, flips the selector, and finishes.
pub fn begin_promote(d: &mut Deployment, now: u64) -> RolloutResult<()> {
    if d.state != DeployState::Shifting {
        return Err(RolloutError::illegal("promote", d.state, "expected shifting"));
    }
    if d.candidate_pool.is_none() {
        return Err(RolloutError::InvariantViolation(format!(
            "{} is shifting with no candidate pool",
            d.name
        )));
    }
    d.record_transition(
        DeployState::Shifting,
        DeployState::Promoting,
        "promote",
        String::new(),
        now,
    );
    Ok(())
}

/// `Promoting → Stable`. Relabels the candidate as the new stable pool
/// (identity swap, not a new pool) and retires the old stable pool.
/// Returns the retired pool's name for deletion.
pub fn finish_promote(d: &mut Deployment, now: u64) -> RolloutResult<String> {
    let mut candidate = d.candidate_pool.take().ok_or_else(|| {
        RolloutError::InvariantViolation(format!("{} promoting with no candidate", d.name))
    })?;
    let retired = d.stable_pool.take().ok_or_else(|| {
        RolloutError::InvariantViolation(format!("{} promoting with no stable pool", d.name))
    })?;

    candidate.label = PoolLabel::Stable;
    candidate.replicas = d.total_capacity;
    let promoted = candidate.name.clone();
    d.stable_pool = Some(candidate);
    d.candidate_weight = 0;
    d.shift_direction = None;
    d.record_transition(
        DeployState::Promoting,
        DeployState::Stable,
        "promote",
        format!("promoted={promoted} retired={}", retired.name),
        now,
    );
    info!(deployment = %d.name, %promoted, retired = %retired.name, "promote finished");
    Ok(retired.name)
}

/// `Promoting → Shifting` when the candidate failed to converge at
/// full capacity: the rollout holds at its last known-good weight
/// instead of completing the promote.
pub fn abort_promote(d: &mut Deployment, reason: &str, now: u64) {
    warn!(deployment = %d.name, %reason, "promote aborted");
    d.record_transition(
        DeployState::Promoting,
        DeployState::Shifting,
        "promote",
        format!("aborted reason={reason}"),
        now,
    );
}

// ── rollback ──────────────────────────────────────────────────────

/// `{Deploying, Shifting} → RollingBack`.
pub fn begin_rollback(d: &mut Deployment, now: u64) -> RolloutResult<()> {
    match d.state {
        DeployState::Deploying | DeployState::Shifting => {
            d.record_transition(d.state, DeployState::RollingBack, "rollback", String::new(), now);
            Ok(())
        }
        state => Err(RolloutError::illegal(
            "rollback",
            state,
            "nothing in flight to roll back",
        )),
    }
}

/// `RollingBack → Stable`. Stable takes 100% again; the candidate pool
/// stays allocated for forensic inspection until an explicit cleanup.
pub fn finish_rollback(d: &mut Deployment, now: u64) {
    if let Some(stable) = d.stable_pool.as_mut() {
        stable.replicas = d.total_capacity;
    }
    d.candidate_weight = 0;
    d.shift_direction = None;
    d.record_transition(
        DeployState::RollingBack,
        DeployState::Stable,
        "rollback",
        String::new(),
        now,
    );
    info!(deployment = %d.name, "rollback finished");
}

// ── cleanup ───────────────────────────────────────────────────────

/// Legal only from `Stable`: drop the non-serving candidate pool from
/// the record. Returns its name for deletion, or `None` when there is
/// nothing to reclaim.
pub fn cleanup(d: &mut Deployment, now: u64) -> RolloutResult<Option<String>> {
    if d.state != DeployState::Stable {
        return Err(RolloutError::illegal("cleanup", d.state, "expected stable"));
    }
    let Some(candidate) = d.candidate_pool.take() else {
        return Ok(None);
    };
    d.record_transition(
        DeployState::Stable,
        DeployState::Stable,
        "cleanup",
        format!("pool={}", candidate.name),
        now,
    );
    info!(deployment = %d.name, pool = %candidate.name, "candidate pool reclaimed");
    Ok(Some(candidate.name))
}

// ── restart recovery ──────────────────────────────────────────────

/// What startup reconciliation did to a record found mid-transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// An in-flight deploy was aborted; candidate scaled to zero.
    AbortedDeploy,
    /// A promote or rollback was resolved by restoring stable at 100%.
    RolledBack,
}

/// Drive a record persisted in a transitional state back to `Stable`.
/// `Shifting` is a valid resting state and is left alone.
pub fn recover(d: &mut Deployment, now: u64) -> Option<Recovery> {
    match d.state {
        DeployState::Deploying => {
            if let Some(candidate) = d.candidate_pool.as_mut() {
                candidate.replicas = 0;
            }
            if let Some(stable) = d.stable_pool.as_mut() {
                stable.replicas = d.total_capacity;
            }
            d.candidate_weight = 0;
            d.shift_direction = None;
            d.record_transition(
                DeployState::Deploying,
                DeployState::Stable,
                "reconcile",
                "aborted in-flight deploy".to_string(),
                now,
            );
            Some(Recovery::AbortedDeploy)
        }
        DeployState::Promoting | DeployState::RollingBack => {
            let from = d.state;
            if let Some(stable) = d.stable_pool.as_mut() {
                stable.replicas = d.total_capacity;
            }
            d.candidate_weight = 0;
            d.shift_direction = None;
            d.record_transition(
                from,
                DeployState::Stable,
                "reconcile",
                "restored stable after interrupted transition".to_string(),
                now,
            );
            Some(Recovery::RolledBack)
        }
        _ => None,
    }
}

// ── invariants ────────────────────────────────────────────────────

/// Defensive record check. A failure here is a controller bug.
pub fn check_invariants(d: &Deployment) -> RolloutResult<()> {
    if d.state != DeployState::Uninitialized {
        let total = d.selector().total_weight();
        if total != 100 {
            return Err(RolloutError::InvariantViolation(format!(
                "{}: selector weights sum to {total}, expected 100",
                d.name
            )));
        }
    }
    if d.strategy == Strategy::Canary && d.state == DeployState::Shifting {
        let stable = d.stable_pool.as_ref().map_or(0, |p| p.replicas);
        let candidate = d.candidate_pool.as_ref().map_or(0, |p| p.replicas);
        if stable + candidate != d.total_capacity {
            return Err(RolloutError::InvariantViolation(format!(
                "{}: pools hold {} replicas, capacity is {}",
                d.name,
                stable + candidate,
                d.total_capacity
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canary(total: u32) -> Deployment {
        Deployment::new("checkout", Strategy::Canary, total, 1000)
    }

    fn shifting_canary() -> Deployment {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();
        begin_deploy(&mut d, "v2", 20, 1001).unwrap();
        confirm_deploy(&mut d, 20, 1002).unwrap();
        d
    }

    // ── init ───────────────────────────────────────────────────────

    #[test]
    fn init_creates_stable_at_full_capacity() {
        let mut d = canary(6);
        let decision = init(&mut d, "v1", 1000).unwrap();

        assert_eq!(
            decision,
            InitDecision::Created { pool: "checkout-g1".to_string() }
        );
        assert_eq!(d.state, DeployState::Stable);
        let stable = d.stable_pool.as_ref().unwrap();
        assert_eq!(stable.replicas, 6);
        assert_eq!(stable.image, "v1");
        assert_eq!(d.candidate_weight, 0);
        assert_eq!(d.history.len(), 1);
        check_invariants(&d).unwrap();
    }

    #[test]
    fn init_same_image_is_noop() {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();
        let decision = init(&mut d, "v1", 1001).unwrap();

        assert_eq!(decision, InitDecision::AlreadyInitialized);
        // No second history entry for the no-op.
        assert_eq!(d.history.len(), 1);
    }

    #[test]
    fn init_different_image_is_rejected() {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();
        let err = init(&mut d, "v2", 1001).unwrap_err();
        assert!(matches!(err, RolloutError::IllegalTransition { .. }));
    }

    // ── deploy ─────────────────────────────────────────────────────

    #[test]
    fn deploy_sizes_pools_for_initial_weight() {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();

        let decision = begin_deploy(&mut d, "v2", 20, 1001).unwrap();
        let DeployDecision::Started(plan) = decision else {
            panic!("expected Started");
        };
        // round-half-up of 1.2 is 1.
        assert_eq!(plan.candidate_replicas, 1);
        assert_eq!(plan.stable_replicas, 5);
        assert_eq!(plan.candidate_pool, "checkout-g2");
        assert_eq!(d.state, DeployState::Deploying);
        // Traffic untouched until the gate passes.
        assert_eq!(d.candidate_weight, 0);
    }

    #[test]
    fn deploy_retry_converges_instead_of_duplicating() {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();
        begin_deploy(&mut d, "v2", 20, 1001).unwrap();
        let history_len = d.history.len();

        let decision = begin_deploy(&mut d, "v2", 20, 1002).unwrap();
        assert!(matches!(decision, DeployDecision::AlreadyInFlight(_)));
        // Still generation 2 — no second candidate pool.
        assert_eq!(d.generation, 2);
        assert_eq!(d.history.len(), history_len);
    }

    #[test]
    fn deploy_different_image_while_in_flight_is_rejected() {
        let mut d = shifting_canary();
        let err = begin_deploy(&mut d, "v3", 10, 2000).unwrap_err();
        assert!(matches!(err, RolloutError::IllegalTransition { .. }));
    }

    #[test]
    fn deploy_from_uninitialized_is_rejected() {
        let mut d = canary(6);
        let err = begin_deploy(&mut d, "v2", 20, 1000).unwrap_err();
        assert!(matches!(err, RolloutError::IllegalTransition { .. }));
    }

    #[test]
    fn blue_green_deploy_runs_full_parallel_set() {
        let mut d = Deployment::new("checkout", Strategy::BlueGreen, 6, 1000);
        init(&mut d, "v1", 1000).unwrap();

        let DeployDecision::Started(plan) = begin_deploy(&mut d, "v2", 50, 1001).unwrap() else {
            panic!("expected Started");
        };
        assert_eq!(plan.candidate_replicas, 6);
        assert_eq!(plan.stable_replicas, 6);

        // Gate pass keeps blue/green dark until promote.
        confirm_deploy(&mut d, 50, 1002).unwrap();
        assert_eq!(d.candidate_weight, 0);
    }

    #[test]
    fn gate_failure_aborts_to_stable() {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();
        begin_deploy(&mut d, "v2", 20, 1001).unwrap();

        abort_deploy(&mut d, "gate timed out", 1002);

        assert_eq!(d.state, DeployState::Stable);
        assert_eq!(d.candidate_weight, 0);
        assert_eq!(d.candidate_pool.as_ref().unwrap().replicas, 0);
        assert_eq!(d.stable_pool.as_ref().unwrap().replicas, 6);
        check_invariants(&d).unwrap();
    }

    // ── shift ──────────────────────────────────────────────────────

    #[test]
    fn shift_recomputes_split() {
        let mut d = shifting_canary();

        let plan = plan_shift(&d, 50).unwrap().unwrap();
        assert_eq!(plan.split, Split { stable: 3, candidate: 3 });
        commit_shift(&mut d, &plan, 2000);

        assert_eq!(d.candidate_weight, 50);
        assert_eq!(d.stable_pool.as_ref().unwrap().replicas, 3);
        assert_eq!(d.candidate_pool.as_ref().unwrap().replicas, 3);
        check_invariants(&d).unwrap();
    }

    #[test]
    fn shift_same_weight_is_noop() {
        let d = shifting_canary();
        assert!(plan_shift(&d, 20).unwrap().is_none());
    }

    #[test]
    fn shift_direction_reversal_is_rejected() {
        let mut d = shifting_canary();

        let plan = plan_shift(&d, 10).unwrap().unwrap(); // 20 → 10, walking down
        commit_shift(&mut d, &plan, 2000);
        let plan = plan_shift(&d, 5).unwrap().unwrap(); // still down, fine
        commit_shift(&mut d, &plan, 2001);

        let err = plan_shift(&d, 30).unwrap_err(); // reversal
        assert!(matches!(err, RolloutError::IllegalTransition { .. }));
    }

    #[test]
    fn shift_sequence_10_30_20_rejected_at_third() {
        let mut d = shifting_canary();
        // Start from 20; walk up.
        let plan = plan_shift(&d, 30).unwrap().unwrap();
        commit_shift(&mut d, &plan, 2000);
        let plan = plan_shift(&d, 60).unwrap().unwrap();
        commit_shift(&mut d, &plan, 2001);

        assert!(plan_shift(&d, 40).is_err());
    }

    #[test]
    fn rollback_resets_direction_lock() {
        let mut d = shifting_canary();
        let plan = plan_shift(&d, 50).unwrap().unwrap();
        commit_shift(&mut d, &plan, 2000);

        begin_rollback(&mut d, 2001).unwrap();
        finish_rollback(&mut d, 2002);

        // A fresh rollout may walk in either direction again.
        assert!(d.shift_direction.is_none());
    }

    #[test]
    fn shift_outside_shifting_is_rejected() {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();
        assert!(plan_shift(&d, 30).is_err());

        begin_deploy(&mut d, "v2", 20, 1001).unwrap();
        assert!(plan_shift(&d, 30).is_err()); // Deploying, not Shifting
    }

    #[test]
    fn shift_clamps_weight_to_100() {
        let d = shifting_canary();
        let plan = plan_shift(&d, 200).unwrap().unwrap();
        assert_eq!(plan.to_weight, 100);
        assert_eq!(plan.split, Split { stable: 0, candidate: 6 });
    }

    #[test]
    fn blue_green_shift_is_rejected() {
        let mut d = Deployment::new("checkout", Strategy::BlueGreen, 6, 1000);
        init(&mut d, "v1", 1000).unwrap();
        begin_deploy(&mut d, "v2", 0, 1001).unwrap();
        confirm_deploy(&mut d, 0, 1002).unwrap();

        let err = plan_shift(&d, 50).unwrap_err();
        assert!(matches!(err, RolloutError::IllegalTransition { .. }));
    }

    // ── promote ────────────────────────────────────────────────────

    #[test]
    fn promote_swaps_pool_identity() {
        let mut d = shifting_canary();
        let plan = plan_shift(&d, 50).unwrap().unwrap();
        commit_shift(&mut d, &plan, 2000);

        begin_promote(&mut d, 2001).unwrap();
        let retired = finish_promote(&mut d, 2002).unwrap();

        assert_eq!(retired, "checkout-g1");
        assert_eq!(d.state, DeployState::Stable);
        let stable = d.stable_pool.as_ref().unwrap();
        // Same pool, relabeled — not a new one.
        assert_eq!(stable.name, "checkout-g2");
        assert_eq!(stable.label, PoolLabel::Stable);
        assert_eq!(stable.image, "v2");
        assert_eq!(stable.replicas, 6);
        assert!(d.candidate_pool.is_none());
        assert_eq!(d.candidate_weight, 0);
        check_invariants(&d).unwrap();
    }

    #[test]
    fn promote_from_stable_is_rejected_without_mutation() {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();
        let before = d.clone();

        let err = begin_promote(&mut d, 1001).unwrap_err();
        assert!(matches!(err, RolloutError::IllegalTransition { .. }));
        // No state mutation, no history entry.
        assert_eq!(d, before);
    }

    // ── rollback ───────────────────────────────────────────────────

    #[test]
    fn rollback_from_shifting_restores_stable() {
        let mut d = shifting_canary();
        let plan = plan_shift(&d, 50).unwrap().unwrap();
        commit_shift(&mut d, &plan, 2000);
        let plan = plan_shift(&d, 80).unwrap().unwrap();
        commit_shift(&mut d, &plan, 2001);

        begin_rollback(&mut d, 2002).unwrap();
        finish_rollback(&mut d, 2003);

        assert_eq!(d.state, DeployState::Stable);
        assert_eq!(d.candidate_weight, 0);
        assert_eq!(d.stable_pool.as_ref().unwrap().replicas, 6);
        // Candidate left allocated for inspection.
        assert!(d.candidate_pool.is_some());
        check_invariants(&d).unwrap();
    }

    #[test]
    fn rollback_from_deploying_is_legal() {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();
        begin_deploy(&mut d, "v2", 20, 1001).unwrap();

        begin_rollback(&mut d, 1002).unwrap();
        finish_rollback(&mut d, 1003);
        assert_eq!(d.state, DeployState::Stable);
    }

    #[test]
    fn rollback_from_stable_is_rejected() {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();
        assert!(begin_rollback(&mut d, 1001).is_err());
    }

    // ── cleanup ────────────────────────────────────────────────────

    #[test]
    fn cleanup_reclaims_candidate_after_rollback() {
        let mut d = shifting_canary();
        begin_rollback(&mut d, 2000).unwrap();
        finish_rollback(&mut d, 2001);

        let deleted = cleanup(&mut d, 2002).unwrap();
        assert_eq!(deleted, Some("checkout-g2".to_string()));
        assert!(d.candidate_pool.is_none());

        // Second cleanup has nothing to do.
        assert_eq!(cleanup(&mut d, 2003).unwrap(), None);
    }

    #[test]
    fn cleanup_outside_stable_is_rejected() {
        let mut d = shifting_canary();
        assert!(cleanup(&mut d, 2000).is_err());
    }

    // ── recovery ───────────────────────────────────────────────────

    #[test]
    fn recover_aborts_persisted_deploying() {
        let mut d = canary(6);
        init(&mut d, "v1", 1000).unwrap();
        begin_deploy(&mut d, "v2", 20, 1001).unwrap();

        let recovery = recover(&mut d, 5000);
        assert_eq!(recovery, Some(Recovery::AbortedDeploy));
        assert_eq!(d.state, DeployState::Stable);
        assert_eq!(d.stable_pool.as_ref().unwrap().replicas, 6);
        assert_eq!(d.candidate_pool.as_ref().unwrap().replicas, 0);
    }

    #[test]
    fn recover_resolves_interrupted_promote() {
        let mut d = shifting_canary();
        begin_promote(&mut d, 2000).unwrap();

        let recovery = recover(&mut d, 5000);
        assert_eq!(recovery, Some(Recovery::RolledBack));
        assert_eq!(d.state, DeployState::Stable);
        assert_eq!(d.candidate_weight, 0);
    }

    #[test]
    fn recover_leaves_resting_states_alone() {
        let mut stable = canary(6);
        init(&mut stable, "v1", 1000).unwrap();
        assert_eq!(recover(&mut stable, 5000), None);

        let mut shifting = shifting_canary();
        assert_eq!(recover(&mut shifting, 5000), None);
        assert_eq!(shifting.state, DeployState::Shifting);
    }

    // ── history ────────────────────────────────────────────────────

    #[test]
    fn history_is_monotonic_and_complete() {
        let mut d = shifting_canary();
        let plan = plan_shift(&d, 50).unwrap().unwrap();
        commit_shift(&mut d, &plan, 2000);
        begin_promote(&mut d, 2001).unwrap();
        finish_promote(&mut d, 2002).unwrap();

        let verbs: Vec<&str> = d.history.iter().map(|h| h.verb.as_str()).collect();
        assert_eq!(verbs, vec!["init", "deploy", "deploy", "shift", "promote", "promote"]);
        // Timestamps never go backwards.
        for pair in d.history.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        // Each entry chains from the previous one's end state.
        for pair in d.history.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
    }

    #[test]
    fn invariant_check_catches_bad_weight_sum() {
        let mut d = shifting_canary();
        // Corrupt the record the way a controller bug would.
        d.stable_pool = None;
        let err = check_invariants(&d).unwrap_err();
        assert!(matches!(err, RolloutError::InvariantViolation(_)));
    }
}
