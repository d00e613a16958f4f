//! Spark Operator - submits and tracks SparkApplication jobs on Kubernetes

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use kube::{Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use spark_common::crd::SparkApplication;
use spark_common::telemetry::{init_telemetry, TelemetryConfig};
use spark_controller::config::{
    default_master_url, default_spark_submit, DEFAULT_SUBMISSION_WORKERS,
};
use spark_controller::ControllerConfig;

/// Spark Operator - runs SparkApplications declared as Kubernetes resources
#[derive(Parser, Debug)]
#[command(name = "spark-operator", version, about, long_about = None)]
struct Cli {
    /// Print the SparkApplication CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "SPARK_OPERATOR_NAMESPACE")]
    namespace: Option<String>,

    /// Number of concurrent spark-submit workers
    #[arg(long, env = "SPARK_OPERATOR_SUBMISSION_WORKERS", default_value_t = DEFAULT_SUBMISSION_WORKERS)]
    submission_workers: usize,

    /// Path of the spark-submit executable (defaults to $SPARK_HOME/bin/spark-submit)
    #[arg(long, env = "SPARK_SUBMIT")]
    spark_submit: Option<PathBuf>,

    /// Seconds a single spark-submit invocation may take
    #[arg(long, env = "SPARK_OPERATOR_SUBMIT_TIMEOUT_SECS", default_value_t = 300)]
    submit_timeout_secs: u64,

    /// Master URL passed to spark-submit (defaults to the in-cluster API server)
    #[arg(long, env = "SPARK_OPERATOR_MASTER")]
    master: Option<String>,

    /// Do not install the SparkApplication CRD on start
    #[arg(long)]
    skip_crd_install: bool,

    /// Emit human-readable logs instead of JSON
    #[arg(long)]
    text_logs: bool,
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: self.namespace.clone().filter(|ns| !ns.is_empty()),
            submission_workers: self.submission_workers,
            spark_submit: self
                .spark_submit
                .clone()
                .unwrap_or_else(default_spark_submit),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
            master_url: self.master.clone().unwrap_or_else(default_master_url),
            install_crd: !self.skip_crd_install,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&SparkApplication::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        json_logs: !cli.text_logs,
        ..Default::default()
    })?;

    let config = cli.controller_config();
    info!(
        namespace = ?config.namespace,
        workers = config.submission_workers,
        spark_submit = %config.spark_submit.display(),
        master = %config.master_url,
        "Starting Spark operator"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let shutdown = CancellationToken::new();
    let tasks = spark_controller::start(config, client, shutdown.clone()).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping controller");
    shutdown.cancel();
    tasks.join().await;
    info!("Spark operator stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_defaults() {
        let cli = Cli::parse_from([
            "spark-operator",
            "--namespace",
            "analytics",
            "--submission-workers",
            "5",
            "--spark-submit",
            "/opt/spark/bin/spark-submit",
            "--master",
            "k8s://https://api:6443",
            "--skip-crd-install",
        ]);
        let config = cli.controller_config();
        assert_eq!(config.namespace.as_deref(), Some("analytics"));
        assert_eq!(config.submission_workers, 5);
        assert_eq!(config.spark_submit, PathBuf::from("/opt/spark/bin/spark-submit"));
        assert_eq!(config.master_url, "k8s://https://api:6443");
        assert!(!config.install_crd);
    }

    #[test]
    fn cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
