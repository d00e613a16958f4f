//! Automatic resubmission after termination

use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::info;

use spark_common::crd::{ApplicationState, RestartPolicy, SparkApplication};
use spark_common::events::{actions, reasons};
use spark_common::metrics;

use crate::controller::SparkApplicationController;

/// Whether an application that ended in `state` should be resubmitted
pub fn should_restart(policy: RestartPolicy, state: ApplicationState) -> bool {
    match policy {
        RestartPolicy::Never | RestartPolicy::Undefined => false,
        RestartPolicy::OnFailure => state == ApplicationState::Failed,
        RestartPolicy::Always => state.is_terminal(),
    }
}

impl SparkApplicationController {
    /// Resubmit a terminated application if its restart policy allows it
    pub(crate) async fn handle_restart(&self, app: &SparkApplication) {
        let policy = app.spec.restart_policy;
        if !should_restart(policy, app.app_state()) {
            return;
        }

        info!(
            app = %app.name_any(),
            state = %app.app_state(),
            policy = %policy,
            "Restarting terminated SparkApplication"
        );
        self.publish(
            app,
            EventType::Normal,
            reasons::RESUBMISSION,
            actions::RESTART,
            format!("Re-submitting SparkApplication: {}", app.name_any()),
        )
        .await;
        metrics::record_restart(&policy.to_string());
        self.submit_app(app, true).await;
    }
}
