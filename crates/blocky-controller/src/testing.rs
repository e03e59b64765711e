//! In-memory `BlockyStore` for reconcile tests
//!
//! Behaves like the API server where the controller can observe it:
//! resourceVersions bump on every write, creates fail on existing objects,
//! replaces and status patches fail on stale versions. Conflicts, transient
//! read failures and latency can be injected.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;

use blocky_common::crd::{Blocky, BlockySpec, ObjectKey};
use blocky_common::retry::RetryConfig;
use blocky_common::{Error, Result};

use crate::store::BlockyStore;

/// Retry config with millisecond delays
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

/// A namespaced Blocky with a uid, as the API server would return it
pub fn sample_blocky(name: &str, size: i32, container_port: i32) -> Blocky {
    let mut blocky = Blocky::new(
        name,
        BlockySpec {
            size,
            container_port,
        },
    );
    blocky.metadata.namespace = Some("default".to_string());
    blocky.metadata.uid = Some(format!("uid-{name}"));
    blocky
}

#[derive(Default)]
struct State {
    blockies: BTreeMap<ObjectKey, Blocky>,
    deployments: BTreeMap<ObjectKey, Deployment>,
    version: u64,
    deployment_creates: usize,
    deployment_replaces: usize,
    status_patches: usize,
    deployment_conflicts: usize,
    status_conflicts: usize,
    fetch_failures: usize,
    latency: Option<Duration>,
}

impl State {
    fn next_version(&mut self) -> Option<String> {
        self.version += 1;
        Some(self.version.to_string())
    }
}

/// Thread-safe in-memory store
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    async fn delay(&self) {
        if let Some(latency) = self.with_state(|s| s.latency) {
            tokio::time::sleep(latency).await;
        }
    }

    /// Store a Blocky as if a user had applied it
    pub fn put_blocky(&self, mut blocky: Blocky) -> ObjectKey {
        let key = ObjectKey::of(&blocky).unwrap();
        self.with_state(|s| {
            blocky.metadata.resource_version = s.next_version();
            s.blockies.insert(key.clone(), blocky);
        });
        key
    }

    /// Edit a stored Blocky's spec, bumping its resourceVersion
    pub fn update_spec(&self, key: &ObjectKey, spec: BlockySpec) {
        self.with_state(|s| {
            let rv = s.next_version();
            let blocky = s.blockies.get_mut(key).unwrap();
            blocky.spec = spec;
            blocky.metadata.resource_version = rv;
        });
    }

    pub fn blocky(&self, key: &ObjectKey) -> Option<Blocky> {
        self.with_state(|s| s.blockies.get(key).cloned())
    }

    pub fn deployment(&self, key: &ObjectKey) -> Option<Deployment> {
        self.with_state(|s| s.deployments.get(key).cloned())
    }

    pub fn deployment_creates(&self) -> usize {
        self.with_state(|s| s.deployment_creates)
    }

    pub fn deployment_replaces(&self) -> usize {
        self.with_state(|s| s.deployment_replaces)
    }

    pub fn status_patches(&self) -> usize {
        self.with_state(|s| s.status_patches)
    }

    /// Total successful writes of any kind
    pub fn writes(&self) -> usize {
        self.with_state(|s| s.deployment_creates + s.deployment_replaces + s.status_patches)
    }

    /// Make the next `n` Deployment writes lose a race with another writer
    pub fn conflict_next_deployment_writes(&self, n: usize) {
        self.with_state(|s| s.deployment_conflicts = n);
    }

    /// Make the next `n` status patches lose a race with another writer
    pub fn conflict_next_status_patches(&self, n: usize) {
        self.with_state(|s| s.status_conflicts = n);
    }

    /// Make the next `n` Deployment reads fail transiently
    pub fn fail_next_fetches(&self, n: usize) {
        self.with_state(|s| s.fetch_failures = n);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.with_state(|s| s.latency = Some(latency));
    }
}

#[async_trait]
impl BlockyStore for InMemoryStore {
    async fn get_blocky(&self, key: &ObjectKey) -> Result<Option<Blocky>> {
        self.delay().await;
        Ok(self.blocky(key))
    }

    async fn patch_blocky_status(&self, blocky: &Blocky) -> Result<Blocky> {
        self.delay().await;
        let key = ObjectKey::of(blocky)?;
        let resource = format!("Blocky {key}");
        self.with_state(|s| {
            if s.status_conflicts > 0 {
                s.status_conflicts -= 1;
                let rv = s.next_version();
                if let Some(stored) = s.blockies.get_mut(&key) {
                    stored.metadata.resource_version = rv;
                }
                return Err(Error::conflict(resource, "injected conflict"));
            }
            let rv = s.next_version();
            let Some(stored) = s.blockies.get_mut(&key) else {
                return Err(Error::conflict(resource, "object no longer exists"));
            };
            if stored.metadata.resource_version != blocky.metadata.resource_version {
                return Err(Error::conflict(resource, "resourceVersion mismatch"));
            }
            stored.status = blocky.status.clone();
            stored.metadata.resource_version = rv;
            let stored = stored.clone();
            s.status_patches += 1;
            Ok(stored)
        })
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>> {
        self.delay().await;
        self.with_state(|s| {
            if s.fetch_failures > 0 {
                s.fetch_failures -= 1;
                return Err(Error::transient_fetch(
                    format!("Deployment {key}"),
                    "injected failure",
                ));
            }
            Ok(s.deployments.get(key).cloned())
        })
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        self.delay().await;
        let key = ObjectKey::of(deployment)?;
        let resource = format!("Deployment {key}");
        self.with_state(|s| {
            if s.deployments.contains_key(&key) {
                return Err(Error::conflict(resource, "already exists"));
            }
            let mut stored = deployment.clone();
            stored.metadata.resource_version = s.next_version();
            stored.metadata.uid = Some(format!("deploy-uid-{}", key.name));
            s.deployments.insert(key, stored.clone());
            s.deployment_creates += 1;
            Ok(stored)
        })
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        self.delay().await;
        let key = ObjectKey::of(deployment)?;
        let resource = format!("Deployment {key}");
        self.with_state(|s| {
            if s.deployment_conflicts > 0 {
                s.deployment_conflicts -= 1;
                let rv = s.next_version();
                if let Some(stored) = s.deployments.get_mut(&key) {
                    stored.metadata.resource_version = rv;
                }
                return Err(Error::conflict(resource, "injected conflict"));
            }
            let rv = s.next_version();
            let Some(stored) = s.deployments.get_mut(&key) else {
                return Err(Error::conflict(resource, "object no longer exists"));
            };
            if stored.metadata.resource_version != deployment.metadata.resource_version {
                return Err(Error::conflict(resource, "resourceVersion mismatch"));
            }
            *stored = deployment.clone();
            stored.metadata.resource_version = rv;
            let stored = stored.clone();
            s.deployment_replaces += 1;
            Ok(stored)
        })
    }
}
