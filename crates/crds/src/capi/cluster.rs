//! Cluster resource
//!
//! Typed view of the Cluster API `Cluster` object. Only the fields the
//! allocator reads or writes are modelled; everything else round-trips
//! through the API server untouched because writes are merge patches.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Endpoint used to reach the control plane
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,

    /// Managed topology (present for ClusterClass based clusters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
}

/// Host/port pair for the control plane endpoint
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// Name of the ClusterClass this cluster is built from
    #[serde(default)]
    pub class: String,

    /// Kubernetes version of the topology
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Variable values handed to the ClusterClass patches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<ClusterVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVariable {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_from: Option<String>,

    /// Raw JSON value of the variable
    pub value: serde_json::Value,
}

impl Cluster {
    /// ClusterClass name, if the cluster uses a managed topology.
    pub fn class_name(&self) -> Option<&str> {
        self.spec
            .topology
            .as_ref()
            .map(|t| t.class.as_str())
            .filter(|c| !c.is_empty())
    }

    /// Annotation value, if set.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// Inserts or replaces a topology variable in place.
    ///
    /// Returns `false` when the cluster has no topology to carry variables.
    pub fn upsert_variable(&mut self, name: &str, value: serde_json::Value) -> bool {
        let Some(topology) = self.spec.topology.as_mut() else {
            return false;
        };
        match topology.variables.iter_mut().find(|v| v.name == name) {
            Some(existing) => existing.value = value,
            None => topology.variables.push(ClusterVariable {
                name: name.to_string(),
                definition_from: None,
                value,
            }),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology_cluster(variables: Vec<ClusterVariable>) -> Cluster {
        Cluster::new(
            "c1",
            ClusterSpec {
                control_plane_endpoint: ApiEndpoint::default(),
                topology: Some(Topology {
                    class: "rke2".to_string(),
                    version: None,
                    variables,
                }),
            },
        )
    }

    #[test]
    fn test_class_name_ignores_empty_class() {
        let mut cluster = topology_cluster(vec![]);
        assert_eq!(cluster.class_name(), Some("rke2"));

        if let Some(topology) = cluster.spec.topology.as_mut() {
            topology.class.clear();
        }
        assert_eq!(cluster.class_name(), None);

        cluster.spec.topology = None;
        assert_eq!(cluster.class_name(), None);
    }

    #[test]
    fn test_upsert_variable_replaces_in_place() {
        let mut cluster = topology_cluster(vec![
            ClusterVariable { name: "a".to_string(), definition_from: None, value: serde_json::json!(1) },
            ClusterVariable { name: "clusterVip".to_string(), definition_from: None, value: serde_json::json!("old") },
        ]);

        assert!(cluster.upsert_variable("clusterVip", serde_json::json!("10.0.0.1")));

        let vars = &cluster.spec.topology.as_ref().unwrap().variables;
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[1].name, "clusterVip");
        assert_eq!(vars[1].value, serde_json::json!("10.0.0.1"));
    }

    #[test]
    fn test_upsert_variable_appends_when_missing() {
        let mut cluster = topology_cluster(vec![]);
        assert!(cluster.upsert_variable("clusterVip", serde_json::json!("10.0.0.1")));
        assert_eq!(cluster.spec.topology.as_ref().unwrap().variables.len(), 1);

        cluster.spec.topology = None;
        assert!(!cluster.upsert_variable("clusterVip", serde_json::json!("10.0.0.1")));
    }

    #[test]
    fn test_deserialize_ignores_unmodelled_fields() {
        let raw = serde_json::json!({
            "apiVersion": "cluster.x-k8s.io/v1beta1",
            "kind": "Cluster",
            "metadata": {"name": "c1", "namespace": "default"},
            "spec": {
                "clusterNetwork": {"pods": {"cidrBlocks": ["10.42.0.0/16"]}},
                "topology": {"class": "rke2", "version": "v1.30.1", "workers": {}}
            }
        });
        let cluster: Cluster = serde_json::from_value(raw).unwrap();
        assert_eq!(cluster.class_name(), Some("rke2"));
        assert_eq!(cluster.spec.control_plane_endpoint, ApiEndpoint::default());
    }
}
