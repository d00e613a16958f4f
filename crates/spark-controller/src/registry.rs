//! In-memory registry of tracked SparkApplications
//!
//! Maps appID to the last record the controller successfully persisted.
//! A single async mutex guards the map, and callers keep the guard for the
//! whole read-update-write of an event, including the status write itself.
//! This serializes every status write issued by one controller instance so
//! no two event streams can read a record and then overwrite each other.

use std::collections::HashMap;

use kube::ResourceExt;
use tokio::sync::{Mutex, MutexGuard};

use spark_common::crd::SparkApplication;

/// Registry of applications currently tracked, keyed by appID
#[derive(Default)]
pub struct ApplicationRegistry {
    apps: Mutex<HashMap<String, SparkApplication>>,
}

impl ApplicationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive access to the registry
    pub async fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            apps: self.apps.lock().await,
        }
    }

    /// Snapshot of the record tracked under `app_id`
    pub async fn get(&self, app_id: &str) -> Option<SparkApplication> {
        self.lock().await.get(app_id).cloned()
    }

    /// Number of tracked applications
    pub async fn len(&self) -> usize {
        self.lock().await.len()
    }

    /// Whether no application is tracked
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// appIDs currently tracked, sorted
    pub async fn app_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().await.apps.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Exclusive access to the registry contents
pub struct RegistryGuard<'a> {
    apps: MutexGuard<'a, HashMap<String, SparkApplication>>,
}

impl RegistryGuard<'_> {
    /// Record tracked under `app_id`
    pub fn get(&self, app_id: &str) -> Option<&SparkApplication> {
        self.apps.get(app_id)
    }

    /// Track `app` under `app_id`, returning the record it replaced
    pub fn insert(
        &mut self,
        app_id: impl Into<String>,
        app: SparkApplication,
    ) -> Option<SparkApplication> {
        self.apps.insert(app_id.into(), app)
    }

    /// Stop tracking `app_id`
    pub fn remove(&mut self, app_id: &str) -> Option<SparkApplication> {
        self.apps.remove(app_id)
    }

    /// appID of the tracked record for a resource, looked up by namespace and name
    pub fn find_app_id(&self, namespace: &str, name: &str) -> Option<String> {
        self.apps
            .iter()
            .find(|(_, app)| {
                app.namespace().as_deref() == Some(namespace) && app.name_any() == name
            })
            .map(|(app_id, _)| app_id.clone())
    }

    /// Number of tracked applications
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Whether no application is tracked
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_common::crd::SparkApplicationSpec;

    fn app(namespace: &str, name: &str) -> SparkApplication {
        let mut app = SparkApplication::new(name, SparkApplicationSpec::default());
        app.metadata.namespace = Some(namespace.to_string());
        app
    }

    #[tokio::test]
    async fn insert_get_remove() {
        let registry = ApplicationRegistry::new();
        assert!(registry.is_empty().await);

        {
            let mut apps = registry.lock().await;
            assert!(apps.insert("pi-1", app("default", "pi")).is_none());
        }

        assert_eq!(registry.len().await, 1);
        assert!(registry.get("pi-1").await.is_some());
        assert!(registry.get("pi-2").await.is_none());

        let removed = registry.lock().await.remove("pi-1");
        assert_eq!(removed.map(|a| a.name_any()), Some("pi".to_string()));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn find_app_id_matches_namespace_and_name() {
        let registry = ApplicationRegistry::new();
        let mut apps = registry.lock().await;
        apps.insert("pi-1", app("default", "pi"));
        apps.insert("pi-2", app("analytics", "pi"));

        assert_eq!(apps.find_app_id("analytics", "pi").as_deref(), Some("pi-2"));
        assert_eq!(apps.find_app_id("default", "pi").as_deref(), Some("pi-1"));
        assert_eq!(apps.find_app_id("default", "wordcount"), None);
    }

    #[tokio::test]
    async fn app_ids_are_sorted() {
        let registry = ApplicationRegistry::new();
        {
            let mut apps = registry.lock().await;
            apps.insert("b-2", app("default", "b"));
            apps.insert("a-1", app("default", "a"));
        }
        assert_eq!(registry.app_ids().await, vec!["a-1", "b-2"]);
    }
}
