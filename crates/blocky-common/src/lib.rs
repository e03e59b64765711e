//! Common types for the Blocky controller: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod metrics;
pub mod retry;
pub mod telemetry;

pub use error::Error;
pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager / reporting component name used for writes and events
pub const CONTROLLER_NAME: &str = "blocky-controller";

/// Environment variable holding the operand image reference
pub const IMAGE_ENV_VAR: &str = "BLOCKY_IMAGE";
