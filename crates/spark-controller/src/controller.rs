//! SparkApplication controller
//!
//! Owns the application registry and wires the dispatcher, the three
//! reducers and the restart logic to their collaborators: the informer, the
//! spark-submit runner and the pod monitor.
//!
//! ```text
//! informer ──create/delete──▶ dispatcher ──▶ submission queue ──▶ runner
//!                                 ▲                                  │
//!                                 │ restart              outcomes ◀──┘
//!                                 │                         │
//! pod monitor ──drivers──▶ driver reducer      app-state reducer
//!             ──executors──▶ executor reducer
//! ```

use std::sync::Arc;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::events::EventType;
use kube::{Client, CustomResourceExt, Resource};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use spark_common::crd::SparkApplication;
use spark_common::events::{EventPublisher, KubeEventPublisher};
use spark_common::{Error, FIELD_MANAGER};

use crate::client::{SparkKubeClient, SparkKubeClientImpl};
use crate::config::ControllerConfig;
use crate::informer::run_informer;
use crate::pod_monitor::{run_pod_monitor, PodUpdateSinks};
use crate::registry::ApplicationRegistry;
use crate::runner::SubmissionRunner;
use crate::submission::SubmissionQueue;

/// Capacity of each pod-update channel
const POD_UPDATE_CHANNEL_CAPACITY: usize = 64;

/// The reconciliation engine for SparkApplications
pub struct SparkApplicationController {
    pub(crate) client: Arc<dyn SparkKubeClient>,
    pub(crate) events: Arc<dyn EventPublisher>,
    pub(crate) registry: ApplicationRegistry,
    pub(crate) submissions: SubmissionQueue,
    pub(crate) master_url: String,
}

impl SparkApplicationController {
    /// Create a controller with an empty registry
    pub fn new(
        client: Arc<dyn SparkKubeClient>,
        events: Arc<dyn EventPublisher>,
        submissions: SubmissionQueue,
        master_url: String,
    ) -> Self {
        Self {
            client,
            events,
            registry: ApplicationRegistry::new(),
            submissions,
            master_url,
        }
    }

    /// Applications currently tracked
    pub fn registry(&self) -> &ApplicationRegistry {
        &self.registry
    }

    pub(crate) async fn publish(
        &self,
        app: &SparkApplication,
        type_: EventType,
        reason: &str,
        action: &str,
        note: String,
    ) {
        self.events
            .publish(&app.object_ref(&()), type_, reason, action, Some(note))
            .await;
    }
}

/// Background tasks started by [`start`]
pub struct ControllerTasks {
    controller: Arc<SparkApplicationController>,
    handles: Vec<JoinHandle<()>>,
}

impl ControllerTasks {
    /// The running controller
    pub fn controller(&self) -> &Arc<SparkApplicationController> {
        &self.controller
    }

    /// Wait for every task to finish
    ///
    /// Tasks finish after the shutdown token passed to [`start`] is
    /// cancelled and the reducers have drained their channels.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Controller task panicked");
            }
        }
    }
}

/// Install or update the SparkApplication CRD using server-side apply
pub async fn ensure_crd_installed(client: &Client) -> Result<(), Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = SparkApplication::crd();
    let name = crd
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::internal_with_context("crd", "generated CRD has no name"))?;

    info!(crd = %name, "Installing SparkApplication CRD");
    crds.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&crd),
    )
    .await?;
    Ok(())
}

/// Start the controller
///
/// Installs the CRD (unless disabled), waits for the SparkApplication
/// informer to deliver its initial list, then launches the runner, the pod
/// monitor and the three reducers. Cancelling `shutdown` stops the watchers
/// and the runner from taking new work; the reducers exit once their
/// channels drain.
pub async fn start(
    config: ControllerConfig,
    client: Client,
    shutdown: CancellationToken,
) -> Result<ControllerTasks, Error> {
    if config.install_crd {
        ensure_crd_installed(&client).await?;
    }

    let (outcome_tx, outcome_rx) = mpsc::channel(config.submission_workers.max(1));
    let (driver_tx, driver_rx) = mpsc::channel(POD_UPDATE_CHANNEL_CAPACITY);
    let (executor_tx, executor_rx) = mpsc::channel(POD_UPDATE_CHANNEL_CAPACITY);

    let (runner, submissions) = SubmissionRunner::new(
        config.submission_workers,
        config.spark_submit.clone(),
        config.submit_timeout,
        outcome_tx,
    );

    let controller = Arc::new(SparkApplicationController::new(
        Arc::new(SparkKubeClientImpl::new(client.clone())),
        Arc::new(KubeEventPublisher::new(client.clone(), FIELD_MANAGER)),
        submissions,
        config.master_url.clone(),
    ));

    let mut handles = Vec::new();

    let (synced_tx, synced_rx) = oneshot::channel();
    handles.push(tokio::spawn(run_informer(
        client.clone(),
        config.namespace.clone(),
        controller.clone(),
        synced_tx,
        shutdown.clone(),
    )));

    tokio::select! {
        synced = synced_rx => synced.map_err(|_| {
            Error::internal_with_context("informer", "informer stopped before its initial sync")
        })?,
        _ = shutdown.cancelled() => {
            info!("Shutdown requested before the informer synced");
            return Ok(ControllerTasks { controller, handles });
        }
    }

    handles.extend(runner.run(shutdown.clone()));
    handles.push(tokio::spawn(run_pod_monitor(
        client,
        config.namespace.clone(),
        PodUpdateSinks {
            drivers: driver_tx,
            executors: executor_tx,
        },
        shutdown,
    )));
    handles.push(tokio::spawn(
        controller.clone().process_app_state_updates(outcome_rx),
    ));
    handles.push(tokio::spawn(
        controller.clone().process_driver_state_updates(driver_rx),
    ));
    handles.push(tokio::spawn(
        controller.clone().process_executor_state_updates(executor_rx),
    ));

    info!(
        namespace = ?config.namespace,
        workers = config.submission_workers,
        "SparkApplication controller started"
    );
    Ok(ControllerTasks { controller, handles })
}
