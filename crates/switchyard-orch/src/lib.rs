//! switchyard-orch — the orchestration seam for Switchyard.
//!
//! The controller never talks to a cluster directly; it goes through
//! the [`OrchestrationClient`] trait, which exposes the four primitives
//! the underlying platform must provide: create/scale a pool, read pool
//! status, delete a pool, and set the routing selector. All of them are
//! fallible network operations with partial-failure semantics.
//!
//! # Components
//!
//! - **`client`** — The `OrchestrationClient` trait and `PoolStatus`
//! - **`retry`** — Bounded exponential-backoff retry for transient failures
//! - **`sim`** — In-memory simulated cluster for tests and local operation

pub mod client;
pub mod error;
pub mod retry;
pub mod sim;

pub use client::{OrchestrationClient, PoolStatus};
pub use error::{OrchError, OrchResult};
pub use retry::{with_retry, RetryPolicy};
pub use sim::SimCluster;
