//! Controller configuration

use std::time::Duration;

use blocky_common::retry::RetryConfig;
use blocky_common::{Error, Result};

/// Default per-reconcile deadline
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default requeue after a Deployment is created
pub const DEFAULT_CREATION_REQUEUE: Duration = Duration::from_secs(5);

/// Runtime settings for the reconcile loop, passed in through `Context`
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Operand image injected into every compiled Deployment
    pub image: String,
    /// Upper bound on the store calls of a single reconcile
    pub reconcile_timeout: Duration,
    /// Requeue delay used to confirm a freshly created Deployment
    pub creation_requeue: Duration,
    /// Backoff applied by the error policy across reconciles
    pub requeue_backoff: RetryConfig,
    /// In-place retry for transient observed-state reads
    pub fetch_retry: RetryConfig,
}

impl ControllerConfig {
    /// Build a config for the given image with default timings
    ///
    /// An empty (or whitespace-only) image is a configuration error.
    pub fn new(image: impl Into<String>) -> Result<Self> {
        let image = image.into().trim().to_string();
        if image.is_empty() {
            return Err(Error::config(format!(
                "operand image is required (set --image or {})",
                blocky_common::IMAGE_ENV_VAR
            )));
        }
        Ok(Self {
            image,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            creation_requeue: DEFAULT_CREATION_REQUEUE,
            requeue_backoff: RetryConfig::default(),
            fetch_retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(2),
                backoff_multiplier: 2.0,
            },
        })
    }

    /// Override the per-reconcile deadline
    pub fn with_reconcile_timeout(mut self, timeout: Duration) -> Self {
        self.reconcile_timeout = timeout;
        self
    }

    /// Override the post-create requeue delay
    pub fn with_creation_requeue(mut self, requeue: Duration) -> Self {
        self.creation_requeue = requeue;
        self
    }
}
