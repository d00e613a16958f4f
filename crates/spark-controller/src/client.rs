//! Kubernetes client seam for the controller
//!
//! Everything the reconciliation engine needs from the API server goes
//! through [`SparkKubeClient`], so the engine can be exercised against mocks
//! and in-memory stores in tests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use spark_common::crd::SparkApplication;
use spark_common::kube_utils::node_external_address;
use spark_common::{Error, FIELD_MANAGER};

/// Trait abstracting Kubernetes client operations for SparkApplications
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SparkKubeClient: Send + Sync {
    /// Fetch the current version of a SparkApplication
    async fn get_application(&self, namespace: &str, name: &str)
        -> Result<SparkApplication, Error>;

    /// Write the status of a SparkApplication
    ///
    /// The write carries the record's resourceVersion; a stale version is
    /// rejected with a 409 conflict (see [`Error::is_conflict`]).
    async fn replace_application_status(
        &self,
        app: &SparkApplication,
    ) -> Result<SparkApplication, Error>;

    /// First external address of a node, or `None` if it has none
    async fn node_external_address(&self, node_name: &str) -> Result<Option<String>, Error>;

    /// Create or update a Service, returning the applied object
    ///
    /// Must be safe to call repeatedly with the same object.
    async fn ensure_service(&self, service: &Service) -> Result<Service, Error>;
}

/// Real Kubernetes client implementation
pub struct SparkKubeClientImpl {
    client: Client,
}

impl SparkKubeClientImpl {
    /// Create a new SparkKubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SparkKubeClient for SparkKubeClientImpl {
    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SparkApplication, Error> {
        let api: Api<SparkApplication> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn replace_application_status(
        &self,
        app: &SparkApplication,
    ) -> Result<SparkApplication, Error> {
        let namespace = app.namespace().ok_or_else(|| {
            Error::validation_for(app.name_any(), "SparkApplication has no namespace")
        })?;
        let api: Api<SparkApplication> = Api::namespaced(self.client.clone(), &namespace);
        let data = serde_json::to_vec(app)?;
        let updated = api
            .replace_status(&app.name_any(), &PostParams::default(), data)
            .await?;
        debug!(
            app = %app.name_any(),
            namespace = %namespace,
            resource_version = ?updated.resource_version(),
            "Persisted SparkApplication status"
        );
        Ok(updated)
    }

    async fn node_external_address(&self, node_name: &str) -> Result<Option<String>, Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let node = api.get(node_name).await?;
        Ok(node_external_address(&node))
    }

    async fn ensure_service(&self, service: &Service) -> Result<Service, Error> {
        let namespace = service
            .namespace()
            .ok_or_else(|| Error::internal_with_context("ui-service", "Service has no namespace"))?;
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let applied = api
            .patch(
                &service.name_any(),
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(service),
            )
            .await?;
        Ok(applied)
    }
}
