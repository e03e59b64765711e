//! Metrics for the Blocky controller
//!
//! OpenTelemetry instruments for:
//! - Reconcile duration and errors
//! - Writes to the managed Deployment

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for Blocky metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("blocky"));

/// Histogram of reconcile duration
///
/// Labels:
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("blocky_reconcile_duration_seconds")
        .with_description("Duration of Blocky reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of reconcile errors
///
/// Labels:
/// - `error_type`: value of `Error::kind()`
pub static RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("blocky_reconcile_errors_total")
        .with_description("Total number of Blocky reconciliation errors")
        .with_unit("{errors}")
        .build()
});

/// Counter of writes to managed Deployments
///
/// Labels:
/// - `operation`: create, update
pub static WORKLOAD_WRITES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("blocky_workload_writes_total")
        .with_description("Total number of Deployment writes issued by the controller")
        .with_unit("{writes}")
        .build()
});

/// Kind of write issued against a managed Deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadWrite {
    /// Deployment was created
    Create,
    /// Deployment was replaced
    Update,
}

impl WorkloadWrite {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

/// Record one Deployment write
pub fn record_workload_write(write: WorkloadWrite) {
    WORKLOAD_WRITES.add(1, &[KeyValue::new("operation", write.as_str())]);
}

/// Times a single reconcile
pub struct ReconcileTimer {
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", "success")],
        );
    }

    /// Record error completion
    pub fn error(self, error_type: &'static str) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", "error")],
        );
        RECONCILE_ERRORS.add(1, &[KeyValue::new("error_type", error_type)]);
    }
}
