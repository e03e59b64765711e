//! Controller runner: builds the Blocky controller future
//!
//! The controller watches Blocky objects and the Deployments they own. A
//! change to either enqueues the owning Blocky's identity.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use blocky_common::crd::Blocky;
use blocky_common::CONTROLLER_NAME;
use blocky_controller::{error_policy, reconcile, Context, ControllerConfig};

/// Watcher timeout (seconds); must stay below the client read timeout so
/// idle watches are closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Label selector matching the Deployments this controller manages
fn managed_selector() -> String {
    format!("app.kubernetes.io/managed-by={CONTROLLER_NAME}")
}

/// Build the Blocky controller future; it completes on SIGTERM/SIGINT
pub fn build_blocky_controller(
    client: Client,
    config: ControllerConfig,
) -> impl Future<Output = ()> + Send {
    let ctx = Arc::new(Context::from_client(client.clone(), config));
    let blockies: Api<Blocky> = Api::all(client.clone());
    let deployments: Api<Deployment> = Api::all(client);

    tracing::info!("- Blocky controller");

    Controller::new(
        blockies,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .owns(
        deployments,
        WatcherConfig::default()
            .labels(&managed_selector())
            .timeout(WATCH_TIMEOUT_SECS),
    )
    .shutdown_on_signal()
    .run(reconcile, error_policy, ctx)
    .for_each(log_reconcile_result("Blocky"))
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::warn!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
