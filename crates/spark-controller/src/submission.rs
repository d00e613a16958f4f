//! spark-submit command construction
//!
//! Turns a dispatched SparkApplication into the argument list handed to
//! `spark-submit`. The appID is injected as a label on the driver and
//! executor pods so the pod monitor can route their lifecycle events back to
//! this submission attempt.

use kube::ResourceExt;
use tokio::sync::mpsc;

use spark_common::crd::SparkApplication;
use spark_common::{Error, SPARK_APP_ID_LABEL, SPARK_APP_NAME_LABEL};

/// Sending half of the submission queue consumed by the runner
pub type SubmissionQueue = mpsc::UnboundedSender<SparkSubmission>;

/// A spark-submit invocation for one submission attempt
#[derive(Clone, Debug, PartialEq)]
pub struct SparkSubmission {
    /// appID of the attempt
    pub app_id: String,
    /// Namespace of the SparkApplication
    pub namespace: String,
    /// Name of the SparkApplication
    pub name: String,
    /// Arguments passed to spark-submit
    pub args: Vec<String>,
}

impl SparkSubmission {
    /// Build the submission for a dispatched application
    pub fn for_app(app: &SparkApplication, master_url: &str) -> Result<Self, Error> {
        let args = build_submission_command_args(app, master_url)?;
        Ok(Self {
            app_id: app.app_id().unwrap_or_default().to_string(),
            namespace: app.namespace().unwrap_or_default(),
            name: app.name_any(),
            args,
        })
    }
}

/// Build the spark-submit argument list for a dispatched application
///
/// Fails if the application has no namespace or appID, no main application
/// file, or is a JVM application without a main class.
pub fn build_submission_command_args(
    app: &SparkApplication,
    master_url: &str,
) -> Result<Vec<String>, Error> {
    let name = app.name_any();
    let namespace = app
        .namespace()
        .ok_or_else(|| Error::validation_for(&name, "SparkApplication has no namespace"))?;
    let app_id = app
        .app_id()
        .ok_or_else(|| Error::validation_for(&name, "SparkApplication has no appID"))?;
    let spec = &app.spec;
    if spec.main_application_file.is_empty() {
        return Err(Error::validation_for(&name, "mainApplicationFile is required"));
    }

    let mut args = vec![
        "--master".to_string(),
        master_url.to_string(),
        "--deploy-mode".to_string(),
        spec.mode.to_string(),
    ];

    if spec.type_.requires_main_class() {
        let main_class = spec
            .main_class
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                Error::validation_for(&name, "mainClass is required for Java and Scala applications")
            })?;
        args.push("--class".to_string());
        args.push(main_class.to_string());
    }

    let mut conf = |key: String, value: &str| {
        args.push("--conf".to_string());
        args.push(format!("{key}={value}"));
    };

    conf("spark.app.name".into(), &name);
    conf("spark.kubernetes.namespace".into(), &namespace);
    if let Some(image) = &spec.image {
        conf("spark.kubernetes.container.image".into(), image);
    }

    // Driver
    let driver = &spec.driver;
    if let Some(image) = &driver.image {
        conf("spark.kubernetes.driver.container.image".into(), image);
    }
    if let Some(cores) = driver.cores {
        conf("spark.driver.cores".into(), &cores.to_string());
    }
    if let Some(memory) = &driver.memory {
        conf("spark.driver.memory".into(), memory);
    }
    if let Some(pod_name) = &driver.pod_name {
        conf("spark.kubernetes.driver.pod.name".into(), pod_name);
    }
    if let Some(account) = &driver.service_account {
        conf(
            "spark.kubernetes.authenticate.driver.serviceAccountName".into(),
            account,
        );
    }
    for (key, value) in &driver.labels {
        conf(format!("spark.kubernetes.driver.label.{key}"), value);
    }

    // Executors
    let executor = &spec.executor;
    if let Some(image) = &executor.image {
        conf("spark.kubernetes.executor.container.image".into(), image);
    }
    if let Some(instances) = executor.instances {
        conf("spark.executor.instances".into(), &instances.to_string());
    }
    if let Some(cores) = executor.cores {
        conf("spark.executor.cores".into(), &cores.to_string());
    }
    if let Some(memory) = &executor.memory {
        conf("spark.executor.memory".into(), memory);
    }
    for (key, value) in &executor.labels {
        conf(format!("spark.kubernetes.executor.label.{key}"), value);
    }

    for (key, value) in &spec.spark_conf {
        conf(key.clone(), value);
    }
    for (key, value) in &spec.hadoop_conf {
        conf(format!("spark.hadoop.{key}"), value);
    }

    // Routing labels come after user configuration so they cannot be overridden
    for role in ["driver", "executor"] {
        conf(
            format!("spark.kubernetes.{role}.label.{SPARK_APP_ID_LABEL}"),
            app_id,
        );
        conf(
            format!("spark.kubernetes.{role}.label.{SPARK_APP_NAME_LABEL}"),
            &name,
        );
    }
    conf(
        "spark.kubernetes.submission.waitAppCompletion".into(),
        "false",
    );

    let deps = &spec.deps;
    for (flag, values) in [
        ("--jars", &deps.jars),
        ("--files", &deps.files),
        ("--py-files", &deps.py_files),
    ] {
        if !values.is_empty() {
            args.push(flag.to_string());
            args.push(values.join(","));
        }
    }

    args.push(spec.main_application_file.clone());
    args.extend(spec.arguments.iter().cloned());

    Ok(args)
}
