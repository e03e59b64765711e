//! Store access for the two kinds the controller touches
//!
//! `BlockyStore` is the seam between the reconcile loop and the API server.
//! All writes are conditional: creates fail if the object exists, replaces
//! and status patches carry the expected `resourceVersion`. The controller
//! never deletes; Deployments are garbage collected through their owner
//! reference.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use blocky_common::crd::{Blocky, ObjectKey};
use blocky_common::{Error, Result, CONTROLLER_NAME};

/// Trait abstracting Kubernetes operations on Blocky and Deployment objects
///
/// Reads return `Ok(None)` for objects that do not exist.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlockyStore: Send + Sync {
    /// Get a Blocky by identity
    async fn get_blocky(&self, key: &ObjectKey) -> Result<Option<Blocky>>;

    /// Persist `blocky.status`, conditional on `blocky`'s resourceVersion
    async fn patch_blocky_status(&self, blocky: &Blocky) -> Result<Blocky>;

    /// Get the Deployment with the given identity
    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>>;

    /// Create a Deployment; an existing object yields `Error::Conflict`
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment>;

    /// Replace a Deployment, conditional on its resourceVersion
    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment>;
}

/// Whether a failed call read or wrote the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// Map a kube error onto the controller's error classes
///
/// - 409 is a conflict
/// - 404 on a write means the object vanished underneath us: a conflict
/// - 429, 5xx and transport failures are transient
/// - any other API rejection stays a (non-retryable) `Kube` error
fn classify(err: kube::Error, resource: &str, access: Access) -> Error {
    let transient = |message: String| match access {
        Access::Read => Error::transient_fetch(resource, message),
        Access::Write => Error::transient_write(resource, message),
    };

    match err {
        kube::Error::Api(ae) if ae.code == 409 => Error::conflict(resource, ae.message),
        kube::Error::Api(ae) if ae.code == 404 && access == Access::Write => {
            Error::conflict(resource, format!("object no longer exists: {}", ae.message))
        }
        kube::Error::Api(ae) if ae.code == 429 || ae.code >= 500 => {
            transient(format!("{} ({})", ae.message, ae.code))
        }
        err @ kube::Error::Api(_) => Error::from(err),
        kube::Error::SerdeError(e) => Error::serialization(e.to_string()),
        other => transient(other.to_string()),
    }
}

/// `BlockyStore` backed by the Kubernetes API server
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn blockies(&self, namespace: &str) -> Api<Blocky> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl BlockyStore for KubeStore {
    async fn get_blocky(&self, key: &ObjectKey) -> Result<Option<Blocky>> {
        self.blockies(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| classify(e, &format!("Blocky {key}"), Access::Read))
    }

    async fn patch_blocky_status(&self, blocky: &Blocky) -> Result<Blocky> {
        let key = ObjectKey::of(blocky)?;
        let resource = format!("Blocky {key}");
        // A merge patch carrying metadata.resourceVersion is rejected with 409
        // when the stored object has moved on.
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": blocky.resource_version() },
            "status": blocky.status,
        });
        let params = PatchParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        };

        let updated = self
            .blockies(&key.namespace)
            .patch_status(&key.name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| classify(e, &resource, Access::Write))?;
        debug!(blocky = %key, "patched Blocky status");
        Ok(updated)
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>> {
        self.deployments(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| classify(e, &format!("Deployment {key}"), Access::Read))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let key = ObjectKey::of(deployment)?;
        self.deployments(&key.namespace)
            .create(&Self::post_params(), deployment)
            .await
            .map_err(|e| classify(e, &format!("Deployment {key}"), Access::Write))
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let key = ObjectKey::of(deployment)?;
        self.deployments(&key.namespace)
            .replace(&key.name, &Self::post_params(), deployment)
            .await
            .map_err(|e| classify(e, &format!("Deployment {key}"), Access::Write))
    }
}
