//! Spark pod monitor
//!
//! Watches driver and executor pods and translates every observed change
//! into a typed state update for the matching reducer. Pods are routed by
//! the appID label injected at submission; pods without it are ignored.

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, ResourceExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use spark_common::kube_utils::label_value;
use spark_common::{
    SPARK_APP_ID_LABEL, SPARK_DRIVER_ROLE, SPARK_EXECUTOR_ID_LABEL, SPARK_EXECUTOR_ROLE,
    SPARK_ROLE_LABEL,
};

use crate::updates::{DriverStateUpdate, ExecutorStateUpdate, PodPhase};

/// Server-side watch timeout, kept below the client read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// State update derived from a Spark pod
#[derive(Clone, Debug, PartialEq)]
pub enum PodUpdate {
    /// The pod is a driver
    Driver(DriverStateUpdate),
    /// The pod is an executor
    Executor(ExecutorStateUpdate),
}

/// Translate a pod into a state update, if it belongs to a tracked submission
pub fn pod_update(pod: &Pod) -> Option<PodUpdate> {
    let app_id = label_value(pod, SPARK_APP_ID_LABEL)?.to_string();
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(PodPhase::from_str_lossy)
        .unwrap_or(PodPhase::Unknown);

    match label_value(pod, SPARK_ROLE_LABEL)? {
        SPARK_DRIVER_ROLE => Some(PodUpdate::Driver(DriverStateUpdate {
            app_id,
            pod_name: pod.name_any(),
            node_name: pod
                .spec
                .as_ref()
                .and_then(|s| s.node_name.clone())
                .filter(|n| !n.is_empty()),
            pod_phase: phase,
        })),
        SPARK_EXECUTOR_ROLE => Some(PodUpdate::Executor(ExecutorStateUpdate {
            app_id,
            executor_id: label_value(pod, SPARK_EXECUTOR_ID_LABEL)
                .unwrap_or_default()
                .to_string(),
            pod_name: pod.name_any(),
            state: phase.executor_state(),
        })),
        _ => None,
    }
}

/// Channels the pod monitor reports on
pub struct PodUpdateSinks {
    /// Driver observations
    pub drivers: mpsc::Sender<DriverStateUpdate>,
    /// Executor observations
    pub executors: mpsc::Sender<ExecutorStateUpdate>,
}

impl PodUpdateSinks {
    /// Route an update; returns false once the receiving side has gone away
    async fn send(&self, update: PodUpdate) -> bool {
        match update {
            PodUpdate::Driver(u) => self.drivers.send(u).await.is_ok(),
            PodUpdate::Executor(u) => self.executors.send(u).await.is_ok(),
        }
    }
}

/// Watch Spark pods until `shutdown` is cancelled
///
/// `namespace` limits the watch to one namespace; `None` watches all.
/// Dropping the sinks on return closes the reducer channels.
pub async fn run_pod_monitor(
    client: Client,
    namespace: Option<String>,
    sinks: PodUpdateSinks,
    shutdown: CancellationToken,
) {
    let api: Api<Pod> = match &namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let config = watcher::Config::default()
        .labels(SPARK_ROLE_LABEL)
        .timeout(WATCH_TIMEOUT_SECS);

    info!(namespace = ?namespace, "Starting Spark pod monitor");
    let mut stream = watcher::watcher(api, config).default_backoff().boxed();

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Spark pod monitor stopping");
                return;
            }
            event = stream.next() => event,
        };

        let pod = match event {
            Some(Ok(Event::Apply(pod) | Event::InitApply(pod) | Event::Delete(pod))) => pod,
            Some(Ok(Event::Init | Event::InitDone)) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "Pod watch error, retrying");
                continue;
            }
            None => {
                warn!("Pod watch stream ended");
                return;
            }
        };

        let Some(update) = pod_update(&pod) else {
            continue;
        };
        debug!(pod = %pod.name_any(), "Observed Spark pod change");
        if !sinks.send(update).await {
            debug!("Reducer channel closed, stopping pod monitor");
            return;
        }
    }
}
