//! SparkApplication CRD types
//!
//! Defines `SparkApplication`, a declaratively-submitted Spark job. Its `.spec`
//! describes what to run; `.status` is owned by the controller and records
//! the current submission attempt (appID), the driver and executor pods, and
//! the application lifecycle state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Language the application is written in
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SparkApplicationType {
    /// JVM application written in Java
    Java,
    /// JVM application written in Scala
    #[default]
    Scala,
    /// PySpark application
    Python,
    /// SparkR application
    R,
}

impl SparkApplicationType {
    /// JVM applications need a main class to be submitted
    pub fn requires_main_class(&self) -> bool {
        matches!(self, Self::Java | Self::Scala)
    }
}

/// Where the driver runs
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Driver runs in a pod inside the cluster
    #[default]
    Cluster,
    /// Driver runs in the submitting process
    Client,
}

impl std::fmt::Display for DeployMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cluster => write!(f, "cluster"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Declared intent for automatic resubmission after the application terminates
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never resubmit
    Never,
    /// Resubmit only when the application failed
    OnFailure,
    /// Resubmit whenever the application terminates
    Always,
    /// No policy declared; behaves like `Never`
    #[default]
    Undefined,
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Never => write!(f, "Never"),
            Self::OnFailure => write!(f, "OnFailure"),
            Self::Always => write!(f, "Always"),
            Self::Undefined => write!(f, "Undefined"),
        }
    }
}

/// Lifecycle state of a SparkApplication submission attempt
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationState {
    /// Accepted by the controller, not yet submitted
    #[default]
    New,
    /// spark-submit succeeded and the driver pod is pending
    Submitted,
    /// Driver is running
    Running,
    /// Driver finished successfully
    Completed,
    /// Driver failed
    Failed,
    /// spark-submit itself failed
    #[serde(rename = "SUBMISSION_FAILED")]
    FailedSubmission,
}

impl ApplicationState {
    /// Terminal states are only reached through the driver lifecycle.
    ///
    /// `FailedSubmission` is not terminal and never triggers a restart.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::FailedSubmission => write!(f, "SUBMISSION_FAILED"),
        }
    }
}

/// Observed state of a single executor pod
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorState {
    /// Pod is waiting to be scheduled or started
    Pending,
    /// Pod is running
    Running,
    /// Pod exited successfully
    Completed,
    /// Pod exited with a failure
    Failed,
    /// Pod phase could not be determined
    Unknown,
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// =============================================================================
// Spec
// =============================================================================

/// Driver pod configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverSpec {
    /// Number of cores for the driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,

    /// Memory for the driver (e.g. "512m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    /// Driver image, overriding `spec.image`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Explicit driver pod name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,

    /// Service account the driver runs as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// Extra labels for the driver pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Executor pod configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorSpec {
    /// Number of executor instances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,

    /// Number of cores per executor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,

    /// Memory per executor (e.g. "1g")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    /// Executor image, overriding `spec.image`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Extra labels for executor pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Files and libraries shipped with the application
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dependencies {
    /// Jars added to the driver and executor classpaths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jars: Vec<String>,

    /// Files placed in the working directory of each executor
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Python dependencies (.zip, .egg, .py)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub py_files: Vec<String>,
}

/// A Spark job to be submitted and tracked by the operator
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "sparkoperator.k8s.io",
    version = "v1alpha1",
    kind = "SparkApplication",
    plural = "sparkapplications",
    shortname = "sparkapp",
    namespaced,
    status = "SparkApplicationStatus",
    printcolumn = r#"{"name":"AppID","type":"string","jsonPath":".status.appId"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.appState.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SparkApplicationSpec {
    /// Application language
    #[serde(rename = "type", default)]
    pub type_: SparkApplicationType,

    /// Deploy mode passed to spark-submit
    #[serde(default)]
    pub mode: DeployMode,

    /// Container image for driver and executors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Entry point class for JVM applications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,

    /// Path or URL of the application jar / script
    #[serde(default)]
    pub main_application_file: String,

    /// Arguments passed to the application
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,

    /// Spark configuration properties
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_conf: BTreeMap<String, String>,

    /// Hadoop configuration properties (passed as `spark.hadoop.*`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hadoop_conf: BTreeMap<String, String>,

    /// Driver configuration
    #[serde(default)]
    pub driver: DriverSpec,

    /// Executor configuration
    #[serde(default)]
    pub executor: ExecutorSpec,

    /// Application dependencies
    #[serde(default)]
    pub deps: Dependencies,

    /// Automatic resubmission policy
    #[serde(default)]
    pub restart_policy: RestartPolicy,

    /// The user runs spark-submit; the operator only tracks the application
    #[serde(default)]
    pub submission_by_user: bool,
}

// =============================================================================
// Status
// =============================================================================

/// Application state together with the reason for a failure
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    /// Current lifecycle state
    #[serde(default)]
    pub state: ApplicationState,

    /// Error output when the state is a failure
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

/// What the controller knows about the driver pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    /// Name of the driver pod
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pod_name: String,

    /// Service exposing the driver web UI
    #[serde(rename = "webUIServiceName", default, skip_serializing_if = "String::is_empty")]
    pub web_ui_service_name: String,

    /// Node port of the web UI service
    #[serde(rename = "webUIPort", default)]
    pub web_ui_port: i32,

    /// `<node external address>:<port>` of the web UI
    #[serde(rename = "webUIAddress", default, skip_serializing_if = "String::is_empty")]
    pub web_ui_address: String,
}

/// Status of a SparkApplication, owned by the controller
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SparkApplicationStatus {
    /// Identifier of the current submission attempt
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_id: String,

    /// Lifecycle state
    #[serde(default)]
    pub app_state: AppState,

    /// Driver pod information
    #[serde(default)]
    pub driver_info: DriverInfo,

    /// Executor pod name to observed state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_state: Option<BTreeMap<String, ExecutorState>>,

    /// When spark-submit accepted the application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_time: Option<DateTime<Utc>>,

    /// When the application finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

impl SparkApplication {
    /// Status of the application, or the empty status if none has been written yet
    pub fn status_or_default(&self) -> SparkApplicationStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Mutable access to the status, creating an empty one if needed
    pub fn status_mut(&mut self) -> &mut SparkApplicationStatus {
        self.status.get_or_insert_with(Default::default)
    }

    /// Current appID, if the application has been dispatched
    pub fn app_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.app_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Current lifecycle state
    pub fn app_state(&self) -> ApplicationState {
        self.status
            .as_ref()
            .map(|s| s.app_state.state)
            .unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================
