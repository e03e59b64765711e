//! Blocky reconciliation engine
//!
//! Drives an `apps/v1 Deployment` toward the state described by a `Blocky`:
//! - `compiler`: pure Blocky to Deployment translation and drift detection
//! - `reader`: observed-state reads with bounded retry
//! - `status`: condition merge and persistence
//! - `controller`: the reconcile loop and error policy

pub mod compiler;
pub mod config;
pub mod controller;
pub mod deadline;
pub mod reader;
pub mod status;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::ControllerConfig;
pub use controller::{error_policy, reconcile, reconcile_key, Context};
pub use store::{BlockyStore, KubeStore};
