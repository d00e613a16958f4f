//! Custom Resource Definitions for the Spark operator

mod application;

pub use application::{
    AppState, ApplicationState, Dependencies, DeployMode, DriverInfo, DriverSpec, ExecutorSpec,
    ExecutorState, RestartPolicy, SparkApplication, SparkApplicationSpec, SparkApplicationStatus,
    SparkApplicationType,
};
