//! Blocky controller implementation
//!
//! Level-based reconciliation: every pass re-reads the Blocky and its
//! Deployment, compiles the target Deployment, writes only when the
//! structural fields drifted, and records the outcome as an `Available`
//! condition. Passes are idempotent, so duplicate or reordered triggers are
//! harmless. Concurrent writers are handled with resourceVersion
//! preconditions and a bounded reload-and-retry.

use std::sync::Arc;

use dashmap::DashMap;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use blocky_common::crd::{
    reasons, Blocky, Condition, ConditionStatus, ObjectKey, CONDITION_AVAILABLE,
};
use blocky_common::events::{actions, reasons as event_reasons};
use blocky_common::metrics::{record_workload_write, ReconcileTimer, WorkloadWrite};
use blocky_common::{Error, EventPublisher, KubeEventPublisher, Result, CONTROLLER_NAME};

use crate::compiler::{compile_deployment, has_drift, overlay_structural};
use crate::config::ControllerConfig;
use crate::deadline::Deadline;
use crate::reader::ObservedStateReader;
use crate::status::StatusRecorder;
use crate::store::{BlockyStore, KubeStore};

/// Attempts at the Deployment write before a conflict is surfaced
const MAX_WORKLOAD_ATTEMPTS: u32 = 2;

/// Attempts at a status write before a conflict is surfaced
const MAX_STATUS_ATTEMPTS: u32 = 3;

// =============================================================================
// Controller context
// =============================================================================

/// Shared state for all reconciles
pub struct Context {
    /// Store for Blocky and Deployment objects
    pub store: Arc<dyn BlockyStore>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Runtime settings
    pub config: ControllerConfig,
    reader: ObservedStateReader,
    recorder: StatusRecorder,
    /// Consecutive retryable failures per Blocky, for backoff
    failures: DashMap<ObjectKey, u32>,
}

impl Context {
    /// Create a context from explicit dependencies
    pub fn new(
        store: Arc<dyn BlockyStore>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            reader: ObservedStateReader::new(store.clone(), config.fetch_retry.clone()),
            recorder: StatusRecorder::new(store.clone()),
            store,
            events,
            config,
            failures: DashMap::new(),
        }
    }

    /// Create a context backed by the API server
    pub fn from_client(client: Client, config: ControllerConfig) -> Self {
        Self::new(
            Arc::new(KubeStore::new(client.clone())),
            Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            config,
        )
    }

    /// Create a context for testing with the given store
    #[cfg(test)]
    pub fn for_testing(store: Arc<dyn BlockyStore>) -> Self {
        let mut config = ControllerConfig::new("quay.io/blocky/blocky:v0.22")
            .expect("test image is non-empty");
        config.fetch_retry = crate::testing::fast_retry();
        Self::new(
            store,
            Arc::new(blocky_common::NoopEventPublisher),
            config,
        )
    }

    /// Consecutive retryable failures recorded for `key`
    pub fn failure_count(&self, key: &ObjectKey) -> u32 {
        self.failures.get(key).map(|c| *c).unwrap_or(0)
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// What the converge step did to the Deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Converged {
    Created,
    Updated,
    Unchanged,
}

/// Reconcile a Blocky resource
///
/// Entry point for `kube::runtime::Controller`. The object handed in may be
/// stale, so the pass works from a fresh read by identity.
#[instrument(skip(blocky, ctx), fields(blocky = %blocky.name_any(), namespace = %blocky.namespace().unwrap_or_default()))]
pub async fn reconcile(blocky: Arc<Blocky>, ctx: Arc<Context>) -> Result<Action> {
    let key = ObjectKey::of(blocky.as_ref())?;
    let timer = ReconcileTimer::start();

    match reconcile_key(&key, &ctx).await {
        Ok(action) => {
            ctx.failures.remove(&key);
            timer.success();
            Ok(action)
        }
        Err(e) => {
            timer.error(e.kind());
            Err(e)
        }
    }
}

/// Reconcile the Blocky with identity `key`
pub async fn reconcile_key(key: &ObjectKey, ctx: &Context) -> Result<Action> {
    let deadline = Deadline::after(ctx.config.reconcile_timeout);

    let Some(blocky) = deadline
        .fetch(&format!("Blocky {key}"), ctx.store.get_blocky(key))
        .await?
    else {
        debug!(blocky = %key, "Blocky no longer exists, nothing to reconcile");
        return Ok(Action::await_change());
    };

    if let Err(e) = blocky.spec.validate(&key.name) {
        warn!(blocky = %key, error = %e, "Blocky spec validation failed");
        let condition = Condition::new(
            CONDITION_AVAILABLE,
            ConditionStatus::False,
            reasons::VALIDATION_FAILED,
            e.to_string(),
        );
        record_condition(ctx, key, &blocky, condition, &deadline).await?;
        publish(
            ctx,
            &blocky,
            EventType::Warning,
            event_reasons::VALIDATION_FAILED,
            actions::RECONCILE,
            e.to_string(),
        )
        .await;
        // A spec change is needed before another pass can succeed
        return Ok(Action::await_change());
    }

    let target = match compile_deployment(&blocky, &ctx.config.image) {
        Ok(target) => target,
        Err(e) => {
            if !e.is_retryable() {
                record_failure(ctx, key, &blocky, &e, &deadline).await;
            }
            return Err(e);
        }
    };
    let size = blocky.spec.size;

    let converged = match converge(key, &target, ctx, &deadline).await {
        Ok(converged) => converged,
        Err(e) => {
            if !e.is_retryable() {
                record_failure(ctx, key, &blocky, &e, &deadline).await;
            }
            return Err(e);
        }
    };

    let mut current = blocky;
    match converged {
        Converged::Created => {
            info!(blocky = %key, replicas = size, "created Deployment");
            record_workload_write(WorkloadWrite::Create);
            publish(
                ctx,
                &current,
                EventType::Normal,
                event_reasons::CREATED,
                actions::CREATE,
                format!("Created Deployment {key}"),
            )
            .await;

            // The Deployment stays in place if this fails; the next pass
            // finds it and records the outcome.
            let creating = Condition::new(
                CONDITION_AVAILABLE,
                ConditionStatus::Unknown,
                reasons::CREATING,
                format!("Creating Deployment for custom resource ({})", key.name),
            );
            if let Some(updated) = record_condition(ctx, key, &current, creating, &deadline).await? {
                current = updated;
            }
        }
        Converged::Updated => {
            info!(blocky = %key, replicas = size, "updated Deployment");
            record_workload_write(WorkloadWrite::Update);
            publish(
                ctx,
                &current,
                EventType::Normal,
                event_reasons::UPDATED,
                actions::UPDATE,
                format!("Updated Deployment {key} to {size} replicas"),
            )
            .await;
        }
        Converged::Unchanged => debug!(blocky = %key, "Deployment matches desired state"),
    }

    // `size` is the spec the target was compiled from; `current` may have
    // been reloaded with a newer one.
    let message = format!(
        "Deployment for custom resource ({}) with {} replicas created successfully",
        key.name, size
    );
    let condition = Condition::new(
        CONDITION_AVAILABLE,
        ConditionStatus::True,
        reasons::RECONCILING,
        message,
    );
    record_condition(ctx, key, &current, condition, &deadline).await?;

    Ok(match converged {
        Converged::Created => Action::requeue(ctx.config.creation_requeue),
        Converged::Updated | Converged::Unchanged => Action::await_change(),
    })
}

/// Bring the stored Deployment in line with `target`
///
/// A lost race (conflict, vanished object, concurrent create) reloads the
/// observed state and diffs again, up to `MAX_WORKLOAD_ATTEMPTS` times.
async fn converge(
    key: &ObjectKey,
    target: &Deployment,
    ctx: &Context,
    deadline: &Deadline,
) -> Result<Converged> {
    let resource = format!("Deployment {key}");
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match ctx.reader.observe(key, deadline).await? {
            None => deadline
                .write(&resource, ctx.store.create_deployment(target))
                .await
                .map(|_| Converged::Created),
            Some(observed) if has_drift(&observed, target) => {
                let desired = overlay_structural(&observed, target);
                deadline
                    .write(&resource, ctx.store.replace_deployment(&desired))
                    .await
                    .map(|_| Converged::Updated)
            }
            Some(_) => Ok(Converged::Unchanged),
        };

        match result {
            Err(e) if e.is_conflict() && attempt < MAX_WORKLOAD_ATTEMPTS => {
                debug!(deployment = %key, attempt, error = %e, "Deployment write conflicted, reloading");
            }
            other => return other,
        }
    }
}

/// Report a failure retrying cannot fix as `Available=False/ReconcileFailed`
async fn record_failure(
    ctx: &Context,
    key: &ObjectKey,
    blocky: &Blocky,
    error: &Error,
    deadline: &Deadline,
) {
    error!(blocky = %key, error = %error, "Deployment rejected");
    let condition = Condition::new(
        CONDITION_AVAILABLE,
        ConditionStatus::False,
        reasons::RECONCILE_FAILED,
        error.to_string(),
    );
    if let Err(status_err) = record_condition(ctx, key, blocky, condition, deadline).await {
        warn!(blocky = %key, error = %status_err, "failed to record reconcile failure");
    }
    publish(
        ctx,
        blocky,
        EventType::Warning,
        event_reasons::RECONCILE_FAILED,
        actions::RECONCILE,
        error.to_string(),
    )
    .await;
}

/// Record a condition, reloading the Blocky on conflict
///
/// Returns the persisted Blocky, or `None` when nothing was written (the
/// condition was already recorded, or the Blocky was deleted meanwhile).
async fn record_condition(
    ctx: &Context,
    key: &ObjectKey,
    blocky: &Blocky,
    condition: Condition,
    deadline: &Deadline,
) -> Result<Option<Blocky>> {
    let mut attempt = 0;
    let mut reloaded: Option<Blocky> = None;

    loop {
        attempt += 1;
        let current = reloaded.as_ref().unwrap_or(blocky);

        match ctx
            .recorder
            .record_condition(current, condition.clone(), deadline)
            .await
        {
            Err(e) if e.is_conflict() && attempt < MAX_STATUS_ATTEMPTS => {
                debug!(blocky = %key, attempt, "status write conflicted, reloading");
                match deadline
                    .fetch(&format!("Blocky {key}"), ctx.store.get_blocky(key))
                    .await?
                {
                    Some(fresh) => reloaded = Some(fresh),
                    None => return Ok(None),
                }
            }
            Err(e) => {
                warn!(blocky = %key, error = %e, "failed to persist Blocky status");
                return Err(e);
            }
            Ok(persisted) => return Ok(persisted),
        }
    }
}

async fn publish(
    ctx: &Context,
    blocky: &Blocky,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&blocky.object_ref(&()), type_, reason, action, Some(note))
        .await;
}

// =============================================================================
// Error policy
// =============================================================================

/// Error policy for Blocky reconciliation
///
/// Retryable errors requeue with exponential backoff keyed on the number of
/// consecutive failures for the object; everything else waits for a change.
pub fn error_policy(blocky: Arc<Blocky>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = ObjectKey::new(blocky.namespace().unwrap_or_default(), blocky.name_any());

    if !error.is_retryable() {
        warn!(blocky = %key, error = %error, "reconcile failed, waiting for a spec change");
        return Action::await_change();
    }

    let attempt = {
        let mut count = ctx.failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    };
    let delay = ctx.config.requeue_backoff.delay_for_attempt(attempt);

    error!(
        blocky = %key,
        error = %error,
        attempt,
        delay_secs = delay.as_secs_f64(),
        "reconcile failed, requeueing"
    );
    Action::requeue(delay)
}
