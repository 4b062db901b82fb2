//! Domain types for the Switchyard state store.
//!
//! These types represent the persisted state of one managed deployment:
//! its strategy, state-machine state, the stable/candidate pool pair,
//! traffic weights, and the append-only transition history. All types
//! are serializable to/from JSON for storage in redb.

use serde::{Deserialize, Serialize};

/// Unique identifier for a deployment (the record key).
pub type DeploymentName = String;

// ── Strategy ──────────────────────────────────────────────────────

/// How traffic moves from the stable pool to the candidate pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Provision the candidate at full capacity, then flip all traffic
    /// in a single atomic selector update.
    BlueGreen,
    /// Redistribute replicas between the two pools in weighted steps,
    /// conserving total capacity.
    Canary,
}

// ── State machine ─────────────────────────────────────────────────

/// State of a deployment within the rollout state machine.
///
/// Legal edges:
/// `Uninitialized → Stable → Deploying → Shifting → {Promoting | RollingBack} → Stable`.
/// `Promoting` and `RollingBack` are transient; a record persisted in
/// one of them means the controller died mid-transition and must be
/// reconciled on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    Uninitialized,
    Stable,
    Deploying,
    Shifting,
    Promoting,
    RollingBack,
}

impl std::fmt::Display for DeployState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Stable => "stable",
            Self::Deploying => "deploying",
            Self::Shifting => "shifting",
            Self::Promoting => "promoting",
            Self::RollingBack => "rolling_back",
        };
        f.write_str(s)
    }
}

// ── Pools ─────────────────────────────────────────────────────────

/// Role of a pool within its deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolLabel {
    Stable,
    Candidate,
}

/// A named, versioned group of workload instances.
///
/// The `name` is the pool's identity in the orchestrator and survives
/// relabeling: promote turns the candidate pool into the new stable
/// pool without re-provisioning it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    pub label: PoolLabel,
    /// Opaque version identifier (image reference).
    pub image: String,
    /// Desired replica count. A pool at 0 replicas is considered
    /// absent but is kept around so rollback can reuse it.
    pub replicas: u32,
}

// ── Routing ───────────────────────────────────────────────────────

/// The live traffic split for one deployment's logical service.
///
/// Invariant: `stable_weight + candidate_weight == 100`. For
/// blue/green exactly one side carries 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSelector {
    pub service: String,
    /// Weight per pool name, in percent.
    pub weights: Vec<(String, u8)>,
}

impl RoutingSelector {
    /// Sum of all pool weights.
    pub fn total_weight(&self) -> u32 {
        self.weights.iter().map(|(_, w)| u32::from(*w)).sum()
    }
}

// ── History ───────────────────────────────────────────────────────

/// One entry in a deployment's append-only transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unix timestamp (seconds) when the transition was recorded.
    pub timestamp: u64,
    pub from: DeployState,
    pub to: DeployState,
    /// The verb that triggered the transition.
    pub verb: String,
    /// Human-readable verb parameters ("image=v2 weight=20").
    pub parameters: String,
}

// ── Deployment ────────────────────────────────────────────────────

/// Direction of the weight walk within one rollout.
///
/// Fixed by the first `shift` after a deploy; reversing it without an
/// intervening rollback is rejected to prevent thrashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftDirection {
    Up,
    Down,
}

/// The persisted record for one managed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: DeploymentName,
    pub strategy: Strategy,
    pub state: DeployState,
    pub stable_pool: Option<Pool>,
    pub candidate_pool: Option<Pool>,
    /// Total replica capacity across both pools (≥ 1).
    pub total_capacity: u32,
    /// Percentage of traffic currently routed to the candidate (0–100).
    pub candidate_weight: u8,
    /// Direction lock for the current rollout, if any shift happened.
    pub shift_direction: Option<ShiftDirection>,
    /// Monotonically increasing pool generation counter. Each deploy
    /// provisions pool `{name}-g{generation}`.
    pub generation: u32,
    /// Append-only transition log; never rewritten.
    pub history: Vec<HistoryEntry>,
    /// Unix timestamp (seconds) when this record was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last mutation.
    pub updated_at: u64,
}

impl Deployment {
    /// Create a fresh, uninitialized record.
    pub fn new(name: &str, strategy: Strategy, total_capacity: u32, now: u64) -> Self {
        Self {
            name: name.to_string(),
            strategy,
            state: DeployState::Uninitialized,
            stable_pool: None,
            candidate_pool: None,
            total_capacity,
            candidate_weight: 0,
            shift_direction: None,
            generation: 0,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Pool name for the next generation.
    pub fn next_pool_name(&self) -> String {
        format!("{}-g{}", self.name, self.generation + 1)
    }

    /// Build the routing selector matching the record's current weights.
    ///
    /// Pools at weight 0 are included with an explicit 0 so the
    /// orchestrator sees the full pool set; the sum is always 100. The
    /// candidate weight is clamped to 100 so a corrupt record cannot
    /// underflow the stable share.
    pub fn selector(&self) -> RoutingSelector {
        let candidate_weight = self.candidate_weight.min(100);
        let mut weights = Vec::new();
        if let Some(stable) = &self.stable_pool {
            weights.push((stable.name.clone(), 100 - candidate_weight));
        }
        if let Some(candidate) = &self.candidate_pool {
            weights.push((candidate.name.clone(), candidate_weight));
        }
        RoutingSelector {
            service: self.name.clone(),
            weights,
        }
    }

    /// Append a transition to the history log.
    pub fn record_transition(
        &mut self,
        from: DeployState,
        to: DeployState,
        verb: &str,
        parameters: String,
        now: u64,
    ) {
        self.history.push(HistoryEntry {
            timestamp: now,
            from,
            to,
            verb: verb.to_string(),
            parameters,
        });
        self.state = to;
        self.updated_at = now;
    }
}
