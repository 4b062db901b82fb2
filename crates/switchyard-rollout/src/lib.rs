//! switchyard-rollout — the rollout engine behind Switchyard's verbs.
//!
//! Four pieces, each testable on its own:
//!
//! - **`planner`** — Pure replica arithmetic: weight percent → pool split
//! - **`gate`** — Deadline-bounded readiness polling with a typed outcome
//! - **`machine`** — The deployment state machine; the only authority on
//!   which transitions are legal
//! - **`router`** — Pushes routing selectors to the orchestrator without
//!   ever letting the weight sum leave 100

pub mod error;
pub mod gate;
pub mod machine;
pub mod planner;
pub mod router;

pub use error::{RolloutError, RolloutResult};
pub use gate::{GateOutcome, HealthGate};
pub use planner::{split, Split};
pub use router::TrafficRouter;
