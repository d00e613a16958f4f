//! spark-submit worker pool
//!
//! A fixed number of workers pull [`SparkSubmission`]s from a shared queue,
//! run `spark-submit` and report the outcome on the submission-outcome
//! channel.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use spark_common::metrics;

use crate::submission::{SparkSubmission, SubmissionQueue};
use crate::updates::AppStateUpdate;

/// Pool of workers running spark-submit
pub struct SubmissionRunner {
    workers: usize,
    spark_submit: PathBuf,
    timeout: Duration,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<SparkSubmission>>>,
    outcomes: mpsc::Sender<AppStateUpdate>,
}

impl SubmissionRunner {
    /// Create a runner and the queue that feeds it
    pub fn new(
        workers: usize,
        spark_submit: PathBuf,
        timeout: Duration,
        outcomes: mpsc::Sender<AppStateUpdate>,
    ) -> (Self, SubmissionQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = Self {
            workers: workers.max(1),
            spark_submit,
            timeout,
            queue: Arc::new(Mutex::new(rx)),
            outcomes,
        };
        (runner, tx)
    }

    /// Spawn the workers
    ///
    /// Workers exit when `shutdown` is cancelled or the queue is closed. A
    /// submission already running is allowed to finish.
    pub fn run(self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(workers = self.workers, spark_submit = %self.spark_submit.display(), "Starting submission runner");
        let runner = Arc::new(self);
        (0..runner.workers)
            .map(|worker| {
                let runner = runner.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { runner.work(worker, shutdown).await })
            })
            .collect()
    }

    async fn work(&self, worker: usize, shutdown: CancellationToken) {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => None,
                submission = self.next_submission() => submission,
            };
            let Some(submission) = next else {
                debug!(worker, "Submission worker stopping");
                return;
            };

            let outcome = self.submit(&submission).await;
            if self.outcomes.send(outcome).await.is_err() {
                debug!(worker, "Submission outcome channel closed");
                return;
            }
        }
    }

    async fn next_submission(&self) -> Option<SparkSubmission> {
        self.queue.lock().await.recv().await
    }

    /// Run spark-submit for one submission and describe the outcome
    pub async fn submit(&self, submission: &SparkSubmission) -> AppStateUpdate {
        info!(
            app = %submission.name,
            app_id = %submission.app_id,
            namespace = %submission.namespace,
            "Submitting SparkApplication"
        );
        match run_spark_submit(&self.spark_submit, &submission.args, self.timeout).await {
            Ok(()) => {
                info!(app_id = %submission.app_id, "spark-submit succeeded");
                AppStateUpdate::submitted(&submission.app_id, Utc::now())
            }
            Err(message) => {
                warn!(app_id = %submission.app_id, error = %message, "spark-submit failed");
                metrics::record_submission_failure(&submission.namespace);
                AppStateUpdate::failed_submission(&submission.app_id, message, Utc::now())
            }
        }
    }
}

/// Run spark-submit, returning stderr (or the launch error) on failure
async fn run_spark_submit(
    spark_submit: &Path,
    args: &[String],
    timeout: Duration,
) -> Result<(), String> {
    let mut cmd = Command::new(spark_submit);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| format!("timed out after {:?}", timeout))?
        .map_err(|e| format!("failed to execute {}: {}", spark_submit.display(), e))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            Err(format!("spark-submit exited with {}", output.status))
        } else {
            Err(stderr)
        }
    }
}
