//! Controller configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default number of concurrent spark-submit workers
pub const DEFAULT_SUBMISSION_WORKERS: usize = 3;

/// Default limit on a single spark-submit invocation
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Runtime configuration of the SparkApplication controller
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Number of concurrent spark-submit workers
    pub submission_workers: usize,
    /// Path of the spark-submit executable
    pub spark_submit: PathBuf,
    /// Limit on a single spark-submit invocation
    pub submit_timeout: Duration,
    /// Master URL handed to spark-submit (`k8s://https://host:port`)
    pub master_url: String,
    /// Install the SparkApplication CRD on start
    pub install_crd: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            submission_workers: DEFAULT_SUBMISSION_WORKERS,
            spark_submit: default_spark_submit(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            master_url: default_master_url(),
            install_crd: true,
        }
    }
}

/// spark-submit under `$SPARK_HOME`, or from `PATH` when unset
pub fn default_spark_submit() -> PathBuf {
    spark_submit_under(std::env::var("SPARK_HOME").ok().as_deref())
}

fn spark_submit_under(spark_home: Option<&str>) -> PathBuf {
    match spark_home.filter(|home| !home.is_empty()) {
        Some(home) => PathBuf::from(home).join("bin").join("spark-submit"),
        None => PathBuf::from("spark-submit"),
    }
}

/// Master URL of the API server this process runs against
pub fn default_master_url() -> String {
    master_url_for(
        std::env::var("KUBERNETES_SERVICE_HOST").ok().as_deref(),
        std::env::var("KUBERNETES_SERVICE_PORT").ok().as_deref(),
    )
}

fn master_url_for(host: Option<&str>, port: Option<&str>) -> String {
    let host = host.filter(|h| !h.is_empty()).unwrap_or("kubernetes.default.svc");
    let port = port.filter(|p| !p.is_empty()).unwrap_or("443");
    if host.contains(':') {
        format!("k8s://https://[{host}]:{port}")
    } else {
        format!("k8s://https://{host}:{port}")
    }
}
