//! End-to-end reconciliation scenarios
//!
//! Drives the controller against an in-memory, versioned application store
//! that behaves like the API server's status subresource: every write must
//! carry the current resourceVersion or it is rejected with a 409.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use tokio::sync::mpsc;

use spark_common::crd::{
    ApplicationState, ExecutorState, RestartPolicy, SparkApplication, SparkApplicationSpec,
};
use spark_common::events::{reasons, RecordingEventPublisher};
use spark_common::Error;
use spark_controller::submission::SparkSubmission;
use spark_controller::{
    AppStateUpdate, DriverStateUpdate, ExecutorStateUpdate, PodPhase, SparkApplicationController,
    SparkKubeClient,
};

const NODE: &str = "node-a";
const NODE_ADDRESS: &str = "203.0.113.10";
const UI_NODE_PORT: i32 = 31040;

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
struct VersionedStore {
    apps: Mutex<HashMap<(String, String), SparkApplication>>,
    writes: AtomicUsize,
    next_uid: AtomicUsize,
}

fn api_error(code: u16, reason: &str) -> Error {
    Error::from(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: reason.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

fn key(app: &SparkApplication) -> (String, String) {
    (app.namespace().unwrap_or_default(), app.name_any())
}

fn bump(version: Option<&str>) -> String {
    let current: u64 = version.and_then(|v| v.parse().ok()).unwrap_or(0);
    (current + 1).to_string()
}

impl VersionedStore {
    fn create(&self, name: &str, spec: SparkApplicationSpec) -> SparkApplication {
        let uid = self.next_uid.fetch_add(1, Ordering::SeqCst);
        let mut app = SparkApplication::new(name, spec);
        app.metadata.namespace = Some("default".to_string());
        app.metadata.uid = Some(format!("uid-{uid}"));
        app.metadata.resource_version = Some("1".to_string());
        self.apps.lock().unwrap().insert(key(&app), app.clone());
        app
    }

    fn current(&self, name: &str) -> SparkApplication {
        self.apps.lock().unwrap()[&("default".to_string(), name.to_string())].clone()
    }

    /// Simulate another writer touching the record
    fn touch(&self, name: &str) {
        let mut apps = self.apps.lock().unwrap();
        if let Some(app) = apps.get_mut(&("default".to_string(), name.to_string())) {
            app.metadata.resource_version = Some(bump(app.metadata.resource_version.as_deref()));
        }
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SparkKubeClient for VersionedStore {
    async fn get_application(&self, namespace: &str, name: &str) -> Result<SparkApplication, Error> {
        self.apps
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| api_error(404, "NotFound"))
    }

    async fn replace_application_status(
        &self,
        app: &SparkApplication,
    ) -> Result<SparkApplication, Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut apps = self.apps.lock().unwrap();
        let stored = apps.get_mut(&key(app)).ok_or_else(|| api_error(404, "NotFound"))?;
        if stored.metadata.resource_version != app.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }
        stored.status = app.status.clone();
        stored.metadata.resource_version = Some(bump(stored.metadata.resource_version.as_deref()));
        Ok(stored.clone())
    }

    async fn node_external_address(&self, node_name: &str) -> Result<Option<String>, Error> {
        Ok((node_name == NODE).then(|| NODE_ADDRESS.to_string()))
    }

    async fn ensure_service(&self, service: &Service) -> Result<Service, Error> {
        let mut applied = service.clone();
        if let Some(ports) = applied.spec.as_mut().and_then(|s| s.ports.as_mut()) {
            for port in ports {
                port.node_port = Some(UI_NODE_PORT);
            }
        }
        Ok(applied)
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    store: Arc<VersionedStore>,
    events: Arc<RecordingEventPublisher>,
    controller: Arc<SparkApplicationController>,
    submissions: mpsc::UnboundedReceiver<SparkSubmission>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(VersionedStore::default());
        let events = Arc::new(RecordingEventPublisher::new());
        let (tx, submissions) = mpsc::unbounded_channel();
        let controller = Arc::new(SparkApplicationController::new(
            store.clone(),
            events.clone(),
            tx,
            "k8s://https://10.96.0.1:443".to_string(),
        ));
        Self {
            store,
            events,
            controller,
            submissions,
        }
    }

    /// Create the resource and deliver its create notification
    async fn create(&self, name: &str, policy: RestartPolicy) -> SparkApplication {
        let app = self.store.create(
            name,
            SparkApplicationSpec {
                main_class: Some("org.apache.spark.examples.SparkPi".to_string()),
                main_application_file: "local:///opt/spark/examples.jar".to_string(),
                restart_policy: policy,
                ..Default::default()
            },
        );
        self.controller.on_create(&app).await;
        self.store.current(name)
    }

    fn drain_submissions(&mut self) -> Vec<SparkSubmission> {
        let mut drained = Vec::new();
        while let Ok(submission) = self.submissions.try_recv() {
            drained.push(submission);
        }
        drained
    }

    async fn driver(&self, app_id: &str, phase: PodPhase) {
        self.controller
            .handle_driver_state_update(DriverStateUpdate {
                app_id: app_id.to_string(),
                pod_name: format!("{app_id}-driver"),
                node_name: Some(NODE.to_string()),
                pod_phase: phase,
            })
            .await;
    }

    async fn executor(&self, app_id: &str, pod: &str, state: ExecutorState) {
        self.controller
            .handle_executor_state_update(ExecutorStateUpdate {
                app_id: app_id.to_string(),
                executor_id: "1".to_string(),
                pod_name: pod.to_string(),
                state,
            })
            .await;
    }

    fn count(&self, reason: &str) -> usize {
        self.events.reasons().iter().filter(|r| *r == reason).count()
    }
}

fn app_id_of(app: &SparkApplication) -> String {
    app.app_id().unwrap_or_default().to_string()
}

// =============================================================================
// Scenarios
// =============================================================================

/// Story: a new application is dispatched exactly once under a fresh appID
#[tokio::test]
async fn create_dispatches_once_under_new_app_id() {
    let mut h = Harness::new();
    let app = h.create("spark-pi", RestartPolicy::Never).await;

    let app_id = app_id_of(&app);
    assert!(app_id.starts_with("spark-pi-"));
    assert_eq!(app.app_state(), ApplicationState::New);
    assert_eq!(app.status_or_default().driver_info.web_ui_port, UI_NODE_PORT);

    assert_eq!(h.controller.registry().app_ids().await, vec![app_id.clone()]);
    let submissions = h.drain_submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].app_id, app_id);
    assert_eq!(h.count(reasons::SUBMISSION), 1);
}

/// Story: submit, run with executors, complete; no restart under Never
#[tokio::test]
async fn full_lifecycle_without_restart() {
    let mut h = Harness::new();
    let app = h.create("spark-pi", RestartPolicy::Never).await;
    let app_id = app_id_of(&app);
    h.drain_submissions();

    let submitted_at = Utc::now();
    h.controller
        .handle_app_state_update(AppStateUpdate::submitted(&app_id, submitted_at))
        .await;
    h.driver(&app_id, PodPhase::Running).await;
    h.executor(&app_id, "pi-exec-1", ExecutorState::Pending).await;
    h.executor(&app_id, "pi-exec-1", ExecutorState::Running).await;
    h.executor(&app_id, "pi-exec-2", ExecutorState::Running).await;

    let running = h.store.current("spark-pi").status_or_default();
    assert_eq!(running.app_state.state, ApplicationState::Submitted);
    assert_eq!(running.submission_time, Some(submitted_at));
    assert_eq!(
        running.driver_info.web_ui_address,
        format!("{NODE_ADDRESS}:{UI_NODE_PORT}")
    );
    assert_eq!(running.executor_state.as_ref().map(|e| e.len()), Some(2));

    h.executor(&app_id, "pi-exec-1", ExecutorState::Completed).await;
    h.driver(&app_id, PodPhase::Succeeded).await;

    let done = h.store.current("spark-pi");
    assert_eq!(done.app_state(), ApplicationState::Completed);
    assert_eq!(app_id_of(&done), app_id);
    assert_eq!(h.count(reasons::TERMINATION), 1);
    assert_eq!(h.count(reasons::RESUBMISSION), 0);
    assert!(h.drain_submissions().is_empty());
}

/// Story: under Always a completed application is resubmitted under a new appID
#[tokio::test]
async fn always_policy_resubmits_with_new_app_id() {
    let mut h = Harness::new();
    let app = h.create("spark-pi", RestartPolicy::Always).await;
    let first_id = app_id_of(&app);
    h.drain_submissions();

    h.driver(&first_id, PodPhase::Succeeded).await;

    let resubmitted = h.store.current("spark-pi");
    let second_id = app_id_of(&resubmitted);
    assert_ne!(second_id, first_id);
    assert!(second_id.starts_with("spark-pi-"));
    assert_eq!(resubmitted.app_state(), ApplicationState::New);
    assert!(resubmitted.status_or_default().driver_info.pod_name.is_empty());

    assert_eq!(h.controller.registry().app_ids().await, vec![second_id.clone()]);
    let submissions = h.drain_submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].app_id, second_id);
    assert_eq!(h.count(reasons::RESUBMISSION), 1);

    // Late events for the previous attempt are ignored
    let writes = h.store.writes();
    h.executor(&first_id, "pi-exec-1", ExecutorState::Failed).await;
    assert_eq!(h.store.writes(), writes);
}

/// Story: OnFailure restarts failures only
#[tokio::test]
async fn on_failure_policy_ignores_success() {
    let mut h = Harness::new();
    let ok = h.create("ok", RestartPolicy::OnFailure).await;
    let failing = h.create("failing", RestartPolicy::OnFailure).await;
    h.drain_submissions();

    h.driver(&app_id_of(&ok), PodPhase::Succeeded).await;
    h.driver(&app_id_of(&failing), PodPhase::Failed).await;

    assert_eq!(h.store.current("ok").app_state(), ApplicationState::Completed);
    let restarted = h.store.current("failing");
    assert_eq!(restarted.app_state(), ApplicationState::New);
    assert_ne!(app_id_of(&restarted), app_id_of(&failing));

    let submissions = h.drain_submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].name, "failing");
}

/// Story: a late submission failure overrides a completed driver
#[tokio::test]
async fn failed_submission_overrides_completed() {
    let h = Harness::new();
    let app = h.create("spark-pi", RestartPolicy::Never).await;
    let app_id = app_id_of(&app);

    h.driver(&app_id, PodPhase::Succeeded).await;
    assert_eq!(h.store.current("spark-pi").app_state(), ApplicationState::Completed);

    h.controller
        .handle_app_state_update(AppStateUpdate::submitted(&app_id, Utc::now()))
        .await;
    assert_eq!(h.store.current("spark-pi").app_state(), ApplicationState::Completed);

    h.controller
        .handle_app_state_update(AppStateUpdate::failed_submission(
            &app_id,
            "Exception in thread main",
            Utc::now(),
        ))
        .await;

    let status = h.store.current("spark-pi").status_or_default();
    assert_eq!(status.app_state.state, ApplicationState::FailedSubmission);
    assert_eq!(status.app_state.error_message, "Exception in thread main");
    assert_eq!(h.count(reasons::SUBMISSION_FAILURE), 1);
}

/// Story: a pending executor never creates an entry and costs no write
#[tokio::test]
async fn pending_executor_is_a_no_op() {
    let h = Harness::new();
    let app = h.create("spark-pi", RestartPolicy::Never).await;
    let writes = h.store.writes();

    h.executor(&app_id_of(&app), "pi-exec-1", ExecutorState::Pending).await;

    assert_eq!(h.store.writes(), writes);
    assert!(h.store.current("spark-pi").status_or_default().executor_state.is_none());
}

/// Story: a concurrent writer forces a re-fetch; the update still lands
#[tokio::test]
async fn stale_version_is_retried_against_fresh_record() {
    let h = Harness::new();
    let app = h.create("spark-pi", RestartPolicy::Never).await;
    let app_id = app_id_of(&app);

    h.store.touch("spark-pi");
    let writes = h.store.writes();
    h.executor(&app_id, "pi-exec-1", ExecutorState::Running).await;

    assert_eq!(h.store.writes(), writes + 2);
    let status = h.store.current("spark-pi").status_or_default();
    assert_eq!(
        status.executor_state.unwrap().get("pi-exec-1"),
        Some(&ExecutorState::Running)
    );

    // The registry tracks the persisted record, so the next write is not stale
    let writes = h.store.writes();
    h.executor(&app_id, "pi-exec-2", ExecutorState::Running).await;
    assert_eq!(h.store.writes(), writes + 1);
}

/// Story: deleting the resource stops tracking; later events are dropped
#[tokio::test]
async fn delete_stops_tracking() {
    let h = Harness::new();
    let app = h.create("spark-pi", RestartPolicy::Always).await;
    let app_id = app_id_of(&app);

    h.controller.on_delete(&app).await;
    assert!(h.controller.registry().is_empty().await);

    let writes = h.store.writes();
    h.driver(&app_id, PodPhase::Failed).await;
    assert_eq!(h.store.writes(), writes);
    assert_eq!(h.count(reasons::DELETION), 1);
    assert_eq!(h.count(reasons::RESUBMISSION), 0);
}

/// Story: the three reducer loops consume their channels independently and
/// exit when the producers go away
#[tokio::test]
async fn reducer_loops_drain_and_exit() {
    let mut h = Harness::new();
    let app = h.create("spark-pi", RestartPolicy::Never).await;
    let app_id = app_id_of(&app);
    h.drain_submissions();

    let (outcome_tx, outcome_rx) = mpsc::channel(4);
    let (driver_tx, driver_rx) = mpsc::channel(4);
    let (executor_tx, executor_rx) = mpsc::channel(4);
    let loops = vec![
        tokio::spawn(h.controller.clone().process_app_state_updates(outcome_rx)),
        tokio::spawn(h.controller.clone().process_driver_state_updates(driver_rx)),
        tokio::spawn(h.controller.clone().process_executor_state_updates(executor_rx)),
    ];

    outcome_tx
        .send(AppStateUpdate::submitted(&app_id, Utc::now()))
        .await
        .unwrap();
    executor_tx
        .send(ExecutorStateUpdate {
            app_id: app_id.clone(),
            executor_id: "1".to_string(),
            pod_name: "pi-exec-1".to_string(),
            state: ExecutorState::Running,
        })
        .await
        .unwrap();
    drop(outcome_tx);
    drop(executor_tx);

    driver_tx
        .send(DriverStateUpdate {
            app_id: app_id.clone(),
            pod_name: "pi-driver".to_string(),
            node_name: None,
            pod_phase: PodPhase::Failed,
        })
        .await
        .unwrap();
    drop(driver_tx);

    for handle in loops {
        handle.await.unwrap();
    }

    let status = h.store.current("spark-pi").status_or_default();
    // Whichever stream lands first, the terminal driver state wins
    assert_eq!(status.app_state.state, ApplicationState::Failed);
    assert_eq!(
        status.executor_state.unwrap().get("pi-exec-1"),
        Some(&ExecutorState::Running)
    );
    assert_eq!(status.driver_info.pod_name, "pi-driver");
}
