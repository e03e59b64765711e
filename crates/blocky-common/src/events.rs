//! Events for `kubectl describe blocky`
//!
//! Publishing never fails the reconcile; errors are only logged.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Sink for Events about a Blocky and its Deployment
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `blocky_ref`; `reason` and `action` come from
    /// [`reasons`] and [`actions`]
    async fn publish(
        &self,
        blocky_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by the events API
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Report as `controller`, with the pod name as instance when set
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        blocky_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, blocky_ref).await {
            warn!(
                blocky = blocky_ref.name.as_deref().unwrap_or_default(),
                reason,
                error = %e,
                "dropped Blocky event"
            );
        }
    }
}

/// Discards every Event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _blocky_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons
pub mod reasons {
    /// Deployment created for a Blocky
    pub const CREATED: &str = "Created";
    /// Deployment updated to match a changed Blocky
    pub const UPDATED: &str = "Updated";
    /// Spec validation failed
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    /// The Deployment write was rejected
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
}

/// Event actions
pub mod actions {
    /// Validation or a rejected write
    pub const RECONCILE: &str = "Reconcile";
    /// Creating the managed Deployment
    pub const CREATE: &str = "Create";
    /// Updating the managed Deployment
    pub const UPDATE: &str = "Update";
}
