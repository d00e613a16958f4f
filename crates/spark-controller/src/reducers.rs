//! State-update reducers
//!
//! One sequential consumer per input stream. Each consumer takes the
//! registry lock for the duration of a single event, folds the event into
//! the tracked record through the status updater, and stores the persisted
//! result back in the registry. Events for appIDs that are no longer tracked
//! are dropped.
//!
//! The fold rules are plain functions over the status so they can be run
//! repeatedly on retry and tested in isolation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use spark_common::crd::{ApplicationState, ExecutorState, SparkApplication, SparkApplicationStatus};
use spark_common::events::{actions, reasons};
use spark_common::metrics;

use crate::controller::SparkApplicationController;
use crate::status::update_application_with_retries;
use crate::updates::{AppStateUpdate, DriverStateUpdate, ExecutorStateUpdate};

// =============================================================================
// Fold rules
// =============================================================================

/// Fold a submission outcome into a status.
///
/// A terminal state is only overwritten by `FailedSubmission`.
pub fn apply_app_state_update(status: &mut SparkApplicationStatus, update: &AppStateUpdate) {
    if !status.app_state.state.is_terminal()
        || update.state == ApplicationState::FailedSubmission
    {
        status.app_state.state = update.state;
        status.app_state.error_message = update.error_message.clone();
    }
    advance(&mut status.submission_time, update.submission_time);
    advance(&mut status.completion_time, update.completion_time);
}

/// Fold a driver pod observation into a status.
///
/// `node_address` is the external address of the driver's node, resolved by
/// the caller. Only terminal driver phases change the application state.
pub fn apply_driver_update(
    status: &mut SparkApplicationStatus,
    update: &DriverStateUpdate,
    node_address: Option<&str>,
) {
    status.driver_info.pod_name = update.pod_name.clone();
    if let Some(address) = node_address {
        status.driver_info.web_ui_address =
            format!("{}:{}", address, status.driver_info.web_ui_port);
    }
    if let Some(state) = update.pod_phase.application_state() {
        if state.is_terminal() {
            status.app_state.state = state;
        }
    }
}

/// Fold an executor pod observation into a status.
///
/// Pending executors are not recorded.
pub fn apply_executor_update(status: &mut SparkApplicationStatus, update: &ExecutorStateUpdate) {
    if update.state == ExecutorState::Pending {
        return;
    }
    status
        .executor_state
        .get_or_insert_with(Default::default)
        .insert(update.pod_name.clone(), update.state);
}

/// Move a timestamp forward; never clears or rewinds it
fn advance(slot: &mut Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) {
    if let Some(at) = incoming {
        if slot.map_or(true, |current| at > current) {
            *slot = Some(at);
        }
    }
}

// =============================================================================
// Consumers
// =============================================================================

impl SparkApplicationController {
    /// Consume submission outcomes until the channel closes
    pub async fn process_app_state_updates(self: Arc<Self>, mut rx: mpsc::Receiver<AppStateUpdate>) {
        while let Some(update) = rx.recv().await {
            self.handle_app_state_update(update).await;
        }
        debug!("Submission outcome channel closed");
    }

    /// Consume driver pod observations until the channel closes
    pub async fn process_driver_state_updates(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<DriverStateUpdate>,
    ) {
        while let Some(update) = rx.recv().await {
            self.handle_driver_state_update(update).await;
        }
        debug!("Driver state channel closed");
    }

    /// Consume executor pod observations until the channel closes
    pub async fn process_executor_state_updates(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<ExecutorStateUpdate>,
    ) {
        while let Some(update) = rx.recv().await {
            self.handle_executor_state_update(update).await;
        }
        debug!("Executor state channel closed");
    }

    /// Fold one submission outcome into the tracked record
    pub async fn handle_app_state_update(&self, update: AppStateUpdate) {
        debug!(app_id = %update.app_id, state = %update.state, "Received submission outcome");

        let updated = {
            let mut apps = self.registry.lock().await;
            let Some(app) = apps.get(&update.app_id).cloned() else {
                debug!(app_id = %update.app_id, "Dropping submission outcome for untracked application");
                return;
            };

            let result = update_application_with_retries(self.client.as_ref(), &app, |to_update| {
                apply_app_state_update(to_update.status_mut(), &update)
            })
            .await;

            match result {
                Ok(Some(updated)) => {
                    apps.insert(update.app_id.clone(), updated.clone());
                    updated
                }
                Ok(None) => return,
                Err(e) => {
                    warn!(app_id = %update.app_id, error = %e, "Dropped submission outcome");
                    return;
                }
            }
        };

        if updated.app_state() == ApplicationState::FailedSubmission {
            self.publish(
                &updated,
                EventType::Warning,
                reasons::SUBMISSION_FAILURE,
                actions::RECONCILE,
                format!("SparkApplication {} failed submission", updated.name_any()),
            )
            .await;
        }
    }

    /// Fold one driver observation into the tracked record, then handle
    /// termination and restart if the driver has finished
    pub async fn handle_driver_state_update(&self, update: DriverStateUpdate) {
        debug!(
            app_id = %update.app_id,
            pod = %update.pod_name,
            phase = %update.pod_phase,
            "Received driver state update"
        );

        let Some(updated) = self.reduce_driver_state_update(&update).await else {
            return;
        };

        let state = updated.app_state();
        if !state.is_terminal() {
            return;
        }

        info!(
            app = %updated.name_any(),
            app_id = %update.app_id,
            state = %state,
            "SparkApplication terminated"
        );
        metrics::record_termination(state);
        self.publish(
            &updated,
            EventType::Normal,
            reasons::TERMINATION,
            actions::RECONCILE,
            format!(
                "SparkApplication {} terminated with state: {}",
                updated.name_any(),
                state
            ),
        )
        .await;
        self.handle_restart(&updated).await;
    }

    /// Persist a driver observation; returns the record if it changed
    async fn reduce_driver_state_update(&self, update: &DriverStateUpdate) -> Option<SparkApplication> {
        let mut apps = self.registry.lock().await;
        let app = apps.get(&update.app_id).cloned()?;

        let node_address = match &update.node_name {
            Some(node) => self.resolve_node_address(node).await,
            None => None,
        };

        let result = update_application_with_retries(self.client.as_ref(), &app, |to_update| {
            apply_driver_update(to_update.status_mut(), update, node_address.as_deref())
        })
        .await;

        match result {
            Ok(Some(updated)) => {
                apps.insert(update.app_id.clone(), updated.clone());
                Some(updated)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(app_id = %update.app_id, error = %e, "Dropped driver state update");
                None
            }
        }
    }

    /// Fold one executor observation into the tracked record
    pub async fn handle_executor_state_update(&self, update: ExecutorStateUpdate) {
        debug!(
            app_id = %update.app_id,
            executor_id = %update.executor_id,
            state = %update.state,
            "Received executor state update"
        );

        let mut apps = self.registry.lock().await;
        let Some(app) = apps.get(&update.app_id).cloned() else {
            return;
        };

        let result = update_application_with_retries(self.client.as_ref(), &app, |to_update| {
            apply_executor_update(to_update.status_mut(), &update)
        })
        .await;

        match result {
            Ok(Some(updated)) => {
                apps.insert(update.app_id.clone(), updated);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(app_id = %update.app_id, error = %e, "Dropped executor state update");
            }
        }
    }

    /// External address of a node; lookup failures resolve to `None`
    async fn resolve_node_address(&self, node_name: &str) -> Option<String> {
        match self.client.node_external_address(node_name).await {
            Ok(address) => address,
            Err(e) => {
                debug!(node = %node_name, error = %e, "Failed to look up node address");
                None
            }
        }
    }
}
