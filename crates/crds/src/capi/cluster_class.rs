//! ClusterClass resource
//!
//! Only the variable declarations are of interest: they decide whether the
//! VIP is injected as a topology variable or written to the endpoint only.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "ClusterClass",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClassSpec {
    /// Variables the class accepts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<ClusterClassVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClassVariable {
    pub name: String,

    #[serde(default)]
    pub required: bool,

    /// OpenAPI schema of the variable, kept opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

impl ClusterClass {
    /// Whether the class declares a variable with the given name.
    pub fn declares_variable(&self, name: &str) -> bool {
        self.spec.variables.iter().any(|v| v.name == name)
    }
}
