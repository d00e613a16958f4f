//! Small helpers over Kubernetes core types

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

/// Address type reported by nodes reachable from outside the cluster
pub const NODE_EXTERNAL_IP: &str = "ExternalIP";

/// Return the first `ExternalIP` address reported by a node
pub fn node_external_address(node: &Node) -> Option<String> {
    node.status
        .as_ref()?
        .addresses
        .as_ref()?
        .iter()
        .find(|addr| addr.type_ == NODE_EXTERNAL_IP)
        .map(|addr| addr.address.clone())
}

/// Value of a label on any Kubernetes object, ignoring empty values
pub fn label_value<'a, K: ResourceExt>(obj: &'a K, key: &str) -> Option<&'a str> {
    obj.labels()
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}
