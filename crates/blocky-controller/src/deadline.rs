//! Per-reconcile deadline for store calls
//!
//! Every read and write issued during one reconcile shares a single
//! `Deadline`. Expiry is reported as a transient error so the error policy
//! requeues instead of a call hanging on an unresponsive API server.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use blocky_common::{Error, Result};

/// Absolute point in time after which store calls fail
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    /// Run a read under the deadline; expiry becomes `TransientFetch`
    pub async fn fetch<T>(
        &self,
        resource: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| Error::transient_fetch(resource, "reconcile deadline exceeded"))?
    }

    /// Run a write under the deadline; expiry becomes `TransientWrite`
    pub async fn write<T>(
        &self,
        resource: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| Error::transient_write(resource, "reconcile deadline exceeded"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_deadline() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let value = deadline
            .fetch("Blocky default/demo", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn slow_read_becomes_transient_fetch() {
        let deadline = Deadline::after(Duration::from_millis(20));
        let result: Result<()> = deadline
            .fetch("Deployment default/demo", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        match result {
            Err(Error::TransientFetch { resource, .. }) => {
                assert_eq!(resource, "Deployment default/demo")
            }
            other => panic!("expected transient fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_write_becomes_transient_write() {
        let deadline = Deadline::after(Duration::from_millis(20));
        let result: Result<()> = deadline
            .write("Deployment default/demo", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::TransientWrite { .. })));
    }

    #[tokio::test]
    async fn inner_errors_pass_through() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let result: Result<()> = deadline
            .write("Blocky default/demo", async {
                Err(Error::conflict("Blocky default/demo", "stale"))
            })
            .await;
        assert!(result.unwrap_err().is_conflict());
    }
}
