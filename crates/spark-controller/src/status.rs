//! Conflict-safe status updates
//!
//! All status writes go through [`update_application_with_retries`]: apply a
//! mutation to a working copy, skip the write if the status did not change,
//! otherwise write it and, when the API server rejects the write, re-fetch
//! the record and run the whole cycle again.
//!
//! Mutations may run more than once for a single update, so they must set
//! final values (never increment) and capture only the delta they apply.
//!
//! Every cycle compares against the caller's snapshot, not the re-fetched
//! record: a rejected write may still have been committed, and the caller
//! must see that change as persisted.

use kube::ResourceExt;
use tracing::{debug, error, warn};

use spark_common::crd::SparkApplication;
use spark_common::metrics::{self, StatusUpdateTimer, UpdateResult};
use spark_common::Error;

use crate::client::SparkKubeClient;

/// Number of mutate-compare-write cycles before an update is dropped
pub const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Apply `mutate` to `original` and persist the resulting status.
///
/// Returns:
/// - `Ok(Some(app))` with the persisted record (and its new resourceVersion)
/// - `Ok(None)` if the mutation left the status unchanged; nothing was written
/// - `Err(Error::UpdateRetriesExhausted)` after [`MAX_UPDATE_ATTEMPTS`] rejected writes
/// - `Err(_)` if re-fetching the record after a rejected write failed
///
/// Any error means the update is lost and the caller must not assume the
/// remote record reflects it.
pub async fn update_application_with_retries<F>(
    client: &dyn SparkKubeClient,
    original: &SparkApplication,
    mutate: F,
) -> Result<Option<SparkApplication>, Error>
where
    F: FnMut(&mut SparkApplication),
{
    let timer = StatusUpdateTimer::start();
    let result = mutate_compare_write(client, original, mutate).await;
    timer.complete(match &result {
        Ok(Some(_)) => UpdateResult::Persisted,
        Ok(None) => UpdateResult::Unchanged,
        Err(_) => UpdateResult::Dropped,
    });
    result
}

async fn mutate_compare_write<F>(
    client: &dyn SparkKubeClient,
    original: &SparkApplication,
    mut mutate: F,
) -> Result<Option<SparkApplication>, Error>
where
    F: FnMut(&mut SparkApplication),
{
    let name = original.name_any();
    let namespace = original.namespace().unwrap_or_default();

    let baseline = original.status_or_default();
    let mut to_update = original.clone();

    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        mutate(&mut to_update);
        if to_update.status_or_default() == baseline {
            return Ok(None);
        }

        let err = match client.replace_application_status(&to_update).await {
            Ok(updated) => return Ok(Some(updated)),
            Err(e) => e,
        };

        if err.is_conflict() {
            metrics::record_conflict();
            debug!(
                app = %name,
                namespace = %namespace,
                attempt,
                "Status write hit a version conflict"
            );
        } else {
            warn!(
                app = %name,
                namespace = %namespace,
                attempt,
                error = %err,
                "Status write failed"
            );
        }

        if attempt == MAX_UPDATE_ATTEMPTS {
            break;
        }

        let fresh = client
            .get_application(&namespace, &name)
            .await
            .map_err(|e| {
                error!(
                    app = %name,
                    namespace = %namespace,
                    error = %e,
                    "Failed to re-fetch SparkApplication, dropping status update"
                );
                e
            })?;
        to_update = fresh;
    }

    error!(
        app = %name,
        namespace = %namespace,
        attempts = MAX_UPDATE_ATTEMPTS,
        "Giving up on status update"
    );
    Err(Error::UpdateRetriesExhausted {
        app: name,
        attempts: MAX_UPDATE_ATTEMPTS,
    })
}
