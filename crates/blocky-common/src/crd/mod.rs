//! Custom Resource Definitions for the Blocky controller

mod blocky;
mod types;

pub use blocky::{Blocky, BlockySpec, BlockyStatus, MAX_SIZE, MIN_SIZE};
pub use types::{Condition, ConditionStatus, ObjectKey};

/// Condition type reporting whether the managed Deployment is available
pub const CONDITION_AVAILABLE: &str = "Available";

/// Well-known condition reasons written by the controller
pub mod reasons {
    /// Deployment is being created for the first time
    pub const CREATING: &str = "Creating";
    /// Deployment has been created or updated to match the spec
    pub const RECONCILING: &str = "Reconciling";
    /// Spec is outside the accepted domain
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    /// The API server rejected the Deployment write
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
}
