//! Observed-state reads

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use tracing::instrument;

use blocky_common::crd::ObjectKey;
use blocky_common::retry::{retry_with_backoff, RetryConfig};
use blocky_common::{Error, Result};

use crate::deadline::Deadline;
use crate::store::BlockyStore;

/// Reads the Deployment currently stored for a Blocky
///
/// A pure read: absent is `Ok(None)`, and every failure surfaces as
/// `Error::TransientFetch` after a bounded number of in-place retries.
pub struct ObservedStateReader {
    store: Arc<dyn BlockyStore>,
    retry: RetryConfig,
}

impl ObservedStateReader {
    /// Create a reader over the given store
    pub fn new(store: Arc<dyn BlockyStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Fetch the Deployment with identity `key`, if it exists
    #[instrument(skip(self, deadline), fields(deployment = %key))]
    pub async fn observe(&self, key: &ObjectKey, deadline: &Deadline) -> Result<Option<Deployment>> {
        let resource = format!("Deployment {key}");
        retry_with_backoff(&self.retry, "get_deployment", Error::is_transient, || {
            deadline.fetch(&resource, self.store.get_deployment(key))
        })
        .await
        .map_err(|e| match e {
            e @ Error::TransientFetch { .. } => e,
            other => Error::transient_fetch(&resource, other.to_string()),
        })
    }
}
