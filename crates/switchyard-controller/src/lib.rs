//! switchyard-controller — the control loop behind the Switchyard verbs.
//!
//! The `Controller` owns every deployment record exclusively: all
//! mutations go through the state machine, operations on one deployment
//! are serialized, and an incoming rollback preempts whatever deploy or
//! shift is in flight. `status` reads a snapshot without blocking the
//! writer.
//!
//! # Components
//!
//! - **`config`** — Controller tuning (gate deadline, poll interval, retry)
//! - **`controller`** — The verb surface: init, deploy, shift, promote,
//!   rollback, cleanup, destroy, status, reconcile

pub mod config;
pub mod controller;
pub mod error;

pub use config::ControllerConfig;
pub use controller::Controller;
pub use error::{ControllerError, ControllerResult};
