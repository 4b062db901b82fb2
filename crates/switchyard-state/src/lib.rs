//! switchyard-state — persisted deployment records for Switchyard.
//!
//! Backed by [redb](https://docs.rs/redb). One record per managed
//! deployment: strategy, state-machine state, the stable/candidate pool
//! pair, traffic weights, and the append-only transition history.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value column, keyed
//! by deployment name. The `StateStore` is `Clone` + `Send` + `Sync`
//! (backed by `Arc<Database>`) and can be shared across async tasks.
//! The persisted record is authoritative: the controller reconciles the
//! live cluster toward it on restart, never the other way around.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
