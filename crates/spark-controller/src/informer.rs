//! SparkApplication informer
//!
//! Turns the raw watch stream into create and delete notifications for the
//! dispatcher. A create is delivered the first time a UID is seen, including
//! during the initial list, so applications that already exist when the
//! controller starts are dispatched again. A re-list after a watch
//! desynchronization reports objects that disappeared in between as deleted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, ResourceExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use spark_common::crd::SparkApplication;

use crate::controller::SparkApplicationController;

/// Server-side watch timeout, kept below the client read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A change the dispatcher must react to
#[derive(Clone, Debug)]
pub enum Notification {
    /// An application was seen for the first time
    Created(SparkApplication),
    /// An application was deleted
    Deleted(SparkApplication),
}

/// Tracks which applications have been announced
#[derive(Default)]
pub struct ApplicationInformer {
    known: HashMap<String, SparkApplication>,
    relisted: Option<HashSet<String>>,
}

impl ApplicationInformer {
    /// Create an informer that has seen nothing yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one watch event, returning the notifications it produces
    pub fn handle(&mut self, event: Event<SparkApplication>) -> Vec<Notification> {
        match event {
            Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(app) => {
                if let (Some(relisted), Some(uid)) = (self.relisted.as_mut(), app.uid()) {
                    relisted.insert(uid);
                }
                self.observe(app).into_iter().collect()
            }
            Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let gone: Vec<String> = self
                    .known
                    .keys()
                    .filter(|uid| !relisted.contains(*uid))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|uid| self.known.remove(&uid))
                    .map(Notification::Deleted)
                    .collect()
            }
            Event::Apply(app) => self.observe(app).into_iter().collect(),
            Event::Delete(app) => {
                if let Some(uid) = app.uid() {
                    self.known.remove(&uid);
                }
                vec![Notification::Deleted(app)]
            }
        }
    }

    fn observe(&mut self, app: SparkApplication) -> Option<Notification> {
        let uid = app.uid()?;
        let first_sighting = self.known.insert(uid, app.clone()).is_none();
        first_sighting.then_some(Notification::Created(app))
    }

    /// Number of applications seen and not deleted
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Whether no application is currently known
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// Watch SparkApplications and feed notifications to the controller
///
/// `synced` fires once the initial list has been delivered. Runs until
/// `shutdown` is cancelled.
pub async fn run_informer(
    client: Client,
    namespace: Option<String>,
    controller: Arc<SparkApplicationController>,
    synced: oneshot::Sender<()>,
    shutdown: CancellationToken,
) {
    let api: Api<SparkApplication> = match &namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let config = watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);

    info!(namespace = ?namespace, "Starting SparkApplication informer");
    let mut stream = watcher::watcher(api, config).default_backoff().boxed();
    let mut informer = ApplicationInformer::new();
    let mut synced = Some(synced);

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("SparkApplication informer stopping");
                return;
            }
            event = stream.next() => event,
        };

        let event = match event {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                warn!(error = %e, "SparkApplication watch error, retrying");
                continue;
            }
            None => {
                warn!("SparkApplication watch stream ended");
                return;
            }
        };

        let init_done = matches!(event, Event::InitDone);
        for notification in informer.handle(event) {
            match notification {
                Notification::Created(app) => {
                    debug!(app = %app.name_any(), "SparkApplication added");
                    controller.on_create(&app).await;
                }
                Notification::Deleted(app) => {
                    debug!(app = %app.name_any(), "SparkApplication deleted");
                    controller.on_delete(&app).await;
                }
            }
        }

        if init_done {
            if let Some(tx) = synced.take() {
                info!(applications = informer.len(), "SparkApplication informer synced");
                let _ = tx.send(());
            }
        }
    }
}
