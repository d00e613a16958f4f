//! Driver web UI exposure
//!
//! Each submission attempt gets a NodePort Service selecting its driver pod
//! by appID. The allocated node port is recorded in the application status
//! and combined with the driver node's external address by the driver
//! reducer.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use spark_common::crd::SparkApplication;
use spark_common::{
    Error, SPARK_APP_ID_LABEL, SPARK_APP_NAME_LABEL, SPARK_DRIVER_ROLE, SPARK_ROLE_LABEL,
};

/// Spark configuration key for the driver UI port
pub const SPARK_UI_PORT_CONF: &str = "spark.ui.port";

/// Port the Spark driver serves its UI on unless configured otherwise
pub const DEFAULT_UI_PORT: i32 = 4040;

const UI_PORT_NAME: &str = "spark-driver-ui-port";

/// Name of the UI Service for an application
pub fn ui_service_name(app: &SparkApplication) -> String {
    format!("{}-ui-svc", app.name_any())
}

/// Driver UI port from `sparkConf`, falling back to [`DEFAULT_UI_PORT`]
pub fn ui_port(app: &SparkApplication) -> i32 {
    app.spec
        .spark_conf
        .get(SPARK_UI_PORT_CONF)
        .and_then(|port| port.trim().parse().ok())
        .unwrap_or(DEFAULT_UI_PORT)
}

/// Build the NodePort Service exposing the driver UI of submission `app_id`
pub fn build_ui_service(app: &SparkApplication, app_id: &str) -> Result<Service, Error> {
    let namespace = app
        .namespace()
        .ok_or_else(|| Error::validation_for(app.name_any(), "SparkApplication has no namespace"))?;
    let port = ui_port(app);

    let labels = BTreeMap::from([(SPARK_APP_NAME_LABEL.to_string(), app.name_any())]);
    let selector = BTreeMap::from([
        (SPARK_APP_ID_LABEL.to_string(), app_id.to_string()),
        (SPARK_ROLE_LABEL.to_string(), SPARK_DRIVER_ROLE.to_string()),
    ]);

    Ok(Service {
        metadata: ObjectMeta {
            name: Some(ui_service_name(app)),
            namespace: Some(namespace),
            labels: Some(labels),
            owner_references: app.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some(UI_PORT_NAME.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// UI details of an applied Service, recorded in the driver info
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UiServiceInfo {
    /// Service name
    pub name: String,
    /// Node port allocated for the UI
    pub node_port: i32,
}

impl UiServiceInfo {
    /// Read the name and allocated node port from an applied Service
    pub fn from_service(service: &Service) -> Option<Self> {
        let node_port = service
            .spec
            .as_ref()?
            .ports
            .as_ref()?
            .iter()
            .find_map(|p| p.node_port)?;
        Some(Self {
            name: service.name_any(),
            node_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_common::crd::SparkApplicationSpec;

    fn app() -> SparkApplication {
        let mut app = SparkApplication::new("spark-pi", SparkApplicationSpec::default());
        app.metadata.namespace = Some("analytics".to_string());
        app.metadata.uid = Some("u1".to_string());
        app
    }

    #[test]
    fn service_selects_driver_by_app_id() {
        let svc = build_ui_service(&app(), "spark-pi-42").unwrap();

        assert_eq!(svc.metadata.name.as_deref(), Some("spark-pi-ui-svc"));
        assert_eq!(svc.metadata.namespace.as_deref(), Some("analytics"));

        let spec = svc.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("NodePort"));
        let selector = spec.selector.unwrap();
        assert_eq!(selector[SPARK_APP_ID_LABEL], "spark-pi-42");
        assert_eq!(selector[SPARK_ROLE_LABEL], SPARK_DRIVER_ROLE);
        assert_eq!(spec.ports.unwrap()[0].port, DEFAULT_UI_PORT);
    }

    #[test]
    fn service_is_owned_by_application() {
        let svc = build_ui_service(&app(), "spark-pi-42").unwrap();
        let owners = svc.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "SparkApplication");
        assert_eq!(owners[0].uid, "u1");
    }

    #[test]
    fn ui_port_from_spark_conf() {
        let mut app = app();
        app.spec
            .spark_conf
            .insert(SPARK_UI_PORT_CONF.to_string(), "4141".to_string());
        assert_eq!(ui_port(&app), 4141);

        app.spec
            .spark_conf
            .insert(SPARK_UI_PORT_CONF.to_string(), "not-a-port".to_string());
        assert_eq!(ui_port(&app), DEFAULT_UI_PORT);
    }

    #[test]
    fn info_requires_allocated_node_port() {
        let mut svc = build_ui_service(&app(), "spark-pi-42").unwrap();
        assert_eq!(UiServiceInfo::from_service(&svc), None);

        if let Some(spec) = svc.spec.as_mut() {
            if let Some(ports) = spec.ports.as_mut() {
                ports[0].node_port = Some(31040);
            }
        }
        assert_eq!(
            UiServiceInfo::from_service(&svc),
            Some(UiServiceInfo {
                name: "spark-pi-ui-svc".to_string(),
                node_port: 31040,
            })
        );
    }

    #[test]
    fn namespace_is_required() {
        let mut app = app();
        app.metadata.namespace = None;
        assert!(build_ui_service(&app, "spark-pi-42").is_err());
    }
}
