//! State-update messages delivered to the reconciliation engine
//!
//! Three independent producers feed the engine: the submission runner
//! ([`AppStateUpdate`]) and the pod monitor ([`DriverStateUpdate`] and
//! [`ExecutorStateUpdate`]).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use spark_common::crd::{ApplicationState, ExecutorState};

/// Outcome of a submission attempt
#[derive(Clone, Debug, PartialEq)]
pub struct AppStateUpdate {
    /// appID the submission was issued for
    pub app_id: String,
    /// Resulting application state
    pub state: ApplicationState,
    /// Error output, empty on success
    pub error_message: String,
    /// When the submission was accepted
    pub submission_time: Option<DateTime<Utc>>,
    /// When the application finished (set for failed submissions)
    pub completion_time: Option<DateTime<Utc>>,
}

impl AppStateUpdate {
    /// spark-submit accepted the application at `at`
    pub fn submitted(app_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            app_id: app_id.into(),
            state: ApplicationState::Submitted,
            error_message: String::new(),
            submission_time: Some(at),
            completion_time: None,
        }
    }

    /// spark-submit failed at `at` with `error_message`
    pub fn failed_submission(
        app_id: impl Into<String>,
        error_message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            state: ApplicationState::FailedSubmission,
            error_message: error_message.into(),
            submission_time: None,
            completion_time: Some(at),
        }
    }
}

/// Observed change of a driver pod
#[derive(Clone, Debug, PartialEq)]
pub struct DriverStateUpdate {
    /// appID from the pod's labels
    pub app_id: String,
    /// Driver pod name
    pub pod_name: String,
    /// Node the pod is scheduled on, once known
    pub node_name: Option<String>,
    /// Current pod phase
    pub pod_phase: PodPhase,
}

/// Observed change of an executor pod
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutorStateUpdate {
    /// appID from the pod's labels
    pub app_id: String,
    /// Spark executor ID
    pub executor_id: String,
    /// Executor pod name
    pub pod_name: String,
    /// Current executor state
    pub state: ExecutorState,
}

/// Kubernetes pod phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodPhase {
    /// Accepted but not all containers are running
    Pending,
    /// Bound to a node with at least one container running
    Running,
    /// All containers terminated successfully
    Succeeded,
    /// All containers terminated and at least one failed
    Failed,
    /// Phase could not be obtained, or an unrecognized value
    Unknown,
}

impl PodPhase {
    /// Parse a phase string, mapping unrecognized values to `Unknown`
    pub fn from_str_lossy(phase: &str) -> Self {
        phase.parse().unwrap_or(Self::Unknown)
    }

    /// Application state implied by the driver being in this phase
    pub fn application_state(&self) -> Option<ApplicationState> {
        match self {
            Self::Pending => Some(ApplicationState::Submitted),
            Self::Running => Some(ApplicationState::Running),
            Self::Succeeded => Some(ApplicationState::Completed),
            Self::Failed => Some(ApplicationState::Failed),
            Self::Unknown => None,
        }
    }

    /// Executor state implied by an executor pod being in this phase
    pub fn executor_state(&self) -> ExecutorState {
        match self {
            Self::Pending => ExecutorState::Pending,
            Self::Running => ExecutorState::Running,
            Self::Succeeded => ExecutorState::Completed,
            Self::Failed => ExecutorState::Failed,
            Self::Unknown => ExecutorState::Unknown,
        }
    }
}

impl FromStr for PodPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Running" => Ok(Self::Running),
            "Succeeded" => Ok(Self::Succeeded),
            "Failed" => Ok(Self::Failed),
            "Unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown pod phase: {other}")),
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}
