//! Metrics registry for Spark operator observability
//!
//! Provides OpenTelemetry metrics for:
//! - Submissions (issued, failed)
//! - Status writes (duration, version conflicts, dropped updates)
//! - Application lifecycle (terminations by state, automatic restarts)

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

use crate::crd::ApplicationState;

/// Global meter for Spark operator metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("spark-operator"));

// ============================================================================
// Submission Metrics
// ============================================================================

/// Counter of submissions handed to the spark-submit runner
///
/// Labels:
/// - `namespace`: application namespace
pub static SUBMISSIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("spark_operator_submissions_total")
        .with_description("Total number of spark-submit invocations queued")
        .with_unit("{submissions}")
        .build()
});

/// Counter of failed spark-submit invocations
pub static SUBMISSION_FAILURES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("spark_operator_submission_failures_total")
        .with_description("Total number of spark-submit invocations that failed")
        .with_unit("{submissions}")
        .build()
});

// ============================================================================
// Status Update Metrics
// ============================================================================

/// Histogram of status update duration, retries included
///
/// Labels:
/// - `result`: persisted, unchanged, dropped
pub static STATUS_UPDATE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("spark_operator_status_update_duration_seconds")
        .with_description("Duration of SparkApplication status updates in seconds")
        .with_unit("s")
        .build()
});

/// Counter of status writes rejected for a stale resourceVersion
pub static STATUS_UPDATE_CONFLICTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("spark_operator_status_update_conflicts_total")
        .with_description("Total number of status writes rejected with a version conflict")
        .with_unit("{conflicts}")
        .build()
});

// ============================================================================
// Lifecycle Metrics
// ============================================================================

/// Counter of applications reaching a terminal state
///
/// Labels:
/// - `state`: completed, failed
pub static TERMINATIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("spark_operator_terminations_total")
        .with_description("Total number of applications that reached a terminal state")
        .with_unit("{applications}")
        .build()
});

/// Counter of automatic resubmissions
///
/// Labels:
/// - `policy`: OnFailure, Always
pub static RESTARTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("spark_operator_restarts_total")
        .with_description("Total number of automatic resubmissions")
        .with_unit("{restarts}")
        .build()
});

// ============================================================================
// Helper Types
// ============================================================================

/// Outcome label for a status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// The new status was written
    Persisted,
    /// The mutation was a no-op; nothing was written
    Unchanged,
    /// The update was abandoned
    Dropped,
}

impl UpdateResult {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persisted => "persisted",
            Self::Unchanged => "unchanged",
            Self::Dropped => "dropped",
        }
    }
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Times one status update, including its retries
pub struct StatusUpdateTimer {
    start: std::time::Instant,
}

impl StatusUpdateTimer {
    /// Start timing a status update
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Record the duration with the given outcome
    pub fn complete(self, result: UpdateResult) {
        STATUS_UPDATE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", result.as_str())],
        );
    }
}

/// Record a submission handed to the runner
pub fn record_submission(namespace: &str) {
    SUBMISSIONS.add(1, &[KeyValue::new("namespace", namespace.to_string())]);
}

/// Record a failed spark-submit invocation
pub fn record_submission_failure(namespace: &str) {
    SUBMISSION_FAILURES.add(1, &[KeyValue::new("namespace", namespace.to_string())]);
}

/// Record a version conflict on a status write
pub fn record_conflict() {
    STATUS_UPDATE_CONFLICTS.add(1, &[]);
}

/// Record an application reaching a terminal state
pub fn record_termination(state: ApplicationState) {
    let label = match state {
        ApplicationState::Completed => "completed",
        ApplicationState::Failed => "failed",
        _ => "other",
    };
    TERMINATIONS.add(1, &[KeyValue::new("state", label)]);
}

/// Record an automatic resubmission
pub fn record_restart(policy: &str) {
    RESTARTS.add(1, &[KeyValue::new("policy", policy.to_string())]);
}
