//! Common types for the Spark operator: CRDs, errors, events, and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name used for server-side apply and status writes
pub const FIELD_MANAGER: &str = "spark-operator";

/// Label carrying the role of a Spark pod (`driver` or `executor`)
pub const SPARK_ROLE_LABEL: &str = "spark-role";

/// Value of [`SPARK_ROLE_LABEL`] on driver pods
pub const SPARK_DRIVER_ROLE: &str = "driver";

/// Value of [`SPARK_ROLE_LABEL`] on executor pods
pub const SPARK_EXECUTOR_ROLE: &str = "executor";

/// Label carrying the executor ID on executor pods
pub const SPARK_EXECUTOR_ID_LABEL: &str = "spark-exec-id";

/// Label the operator injects on driver and executor pods to route events by appID
pub const SPARK_APP_ID_LABEL: &str = "sparkoperator.k8s.io/app-id";

/// Label the operator puts on resources it creates for an application
pub const SPARK_APP_NAME_LABEL: &str = "sparkoperator.k8s.io/app-name";
