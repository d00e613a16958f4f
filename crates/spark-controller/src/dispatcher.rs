//! Submission dispatch
//!
//! Reacts to create and delete notifications. A dispatch assigns a new
//! appID, resets the application state and exposes the driver UI in a
//! single status write, then registers the persisted record and queues the
//! spark-submit invocation. Nothing is registered or submitted unless the
//! status write succeeded.

use chrono::Utc;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{debug, error, info, warn};

use spark_common::crd::{ApplicationState, SparkApplication};
use spark_common::events::{actions, reasons};
use spark_common::metrics;

use crate::app_id::build_app_id;
use crate::controller::SparkApplicationController;
use crate::status::update_application_with_retries;
use crate::submission::SparkSubmission;
use crate::ui_service::{build_ui_service, UiServiceInfo};

impl SparkApplicationController {
    /// Handle a newly observed SparkApplication
    pub async fn on_create(&self, app: &SparkApplication) {
        self.publish(
            app,
            EventType::Normal,
            reasons::SUBMISSION,
            actions::SUBMIT,
            format!("Submitting SparkApplication: {}", app.name_any()),
        )
        .await;
        self.submit_app(app, false).await;
    }

    /// Handle a deleted SparkApplication
    ///
    /// Only the registry entry is removed; the remote record is owned by
    /// the API server.
    pub async fn on_delete(&self, app: &SparkApplication) {
        self.publish(
            app,
            EventType::Normal,
            reasons::DELETION,
            actions::DELETE,
            format!("Deleting SparkApplication: {}", app.name_any()),
        )
        .await;

        let name = app.name_any();
        let namespace = app.namespace().unwrap_or_default();

        let mut apps = self.registry.lock().await;
        let app_id = match app.app_id() {
            Some(id) if apps.get(id).is_some() => Some(id.to_string()),
            _ => apps.find_app_id(&namespace, &name),
        };
        match app_id {
            Some(app_id) => {
                apps.remove(&app_id);
                info!(app = %name, namespace = %namespace, app_id = %app_id, "Stopped tracking SparkApplication");
            }
            None => debug!(app = %name, namespace = %namespace, "Deleted SparkApplication was not tracked"),
        }
    }

    /// Dispatch a submission attempt for `app`
    ///
    /// With `resubmission` the previous status is discarded first.
    pub(crate) async fn submit_app(&self, app: &SparkApplication, resubmission: bool) {
        let name = app.name_any();
        let mut apps = self.registry.lock().await;

        let app_id = build_app_id(app, Utc::now());
        let ui = self.provision_ui_service(app, &app_id).await;

        let result = update_application_with_retries(self.client.as_ref(), app, |to_update| {
            if resubmission {
                to_update.status = Some(Default::default());
            }
            let status = to_update.status_mut();
            status.app_id = app_id.clone();
            status.app_state.state = ApplicationState::New;
            if let Some(ui) = &ui {
                status.driver_info.web_ui_service_name = ui.name.clone();
                status.driver_info.web_ui_port = ui.node_port;
            }
        })
        .await;

        let updated = match result {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                debug!(app = %name, "Dispatch produced no status change, abandoning");
                return;
            }
            Err(e) => {
                error!(app = %name, error = %e, "Failed to persist dispatch, abandoning");
                return;
            }
        };

        if let Some(previous) = app.app_id().filter(|prev| *prev != app_id) {
            apps.remove(previous);
        }
        apps.insert(app_id.clone(), updated.clone());
        info!(app = %name, app_id = %app_id, resubmission, "Dispatched SparkApplication");

        let submission = match SparkSubmission::for_app(&updated, &self.master_url) {
            Ok(submission) => submission,
            Err(e) => {
                error!(
                    app = %name,
                    app_id = %app_id,
                    error = %e,
                    "Failed to build the submission command"
                );
                return;
            }
        };

        if updated.spec.submission_by_user {
            debug!(app = %name, app_id = %app_id, "Application is submitted by its user, not queueing");
            return;
        }

        let namespace = submission.namespace.clone();
        if self.submissions.send(submission).is_err() {
            warn!(app = %name, app_id = %app_id, "Submission queue closed, dropping submission");
            return;
        }
        metrics::record_submission(&namespace);
    }

    /// Create or update the driver UI Service; failures leave the UI unset
    async fn provision_ui_service(&self, app: &SparkApplication, app_id: &str) -> Option<UiServiceInfo> {
        let service = match build_ui_service(app, app_id) {
            Ok(service) => service,
            Err(e) => {
                warn!(app = %app.name_any(), error = %e, "Cannot build driver UI service");
                return None;
            }
        };

        match self.client.ensure_service(&service).await {
            Ok(applied) => UiServiceInfo::from_service(&applied),
            Err(e) => {
                warn!(
                    app = %app.name_any(),
                    service = %service.name_any(),
                    error = %e,
                    "Failed to expose driver UI"
                );
                None
            }
        }
    }
}
