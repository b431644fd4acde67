//! Object references used by the IPAM contract
//!
//! The IPAM resources point at each other with the usual Kubernetes
//! reference shapes: typed references for pools, plain local references
//! between a claim and its address.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::labels::{GLOBAL_POOL_KIND, IPAM_GROUP};

/// Reference to an object of a given group and kind (`TypedLocalObjectReference`)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TypedLocalObjectReference {
    /// API group of the referenced resource (e.g., "ipam.cluster.x-k8s.io")
    #[serde(default)]
    pub api_group: String,

    /// Kind of the referenced resource (e.g., "GlobalInClusterIPPool")
    pub kind: String,

    /// Name of the referenced resource
    pub name: String,
}

impl TypedLocalObjectReference {
    /// Reference to a `GlobalInClusterIPPool`
    pub fn global_pool(name: impl Into<String>) -> Self {
        Self {
            api_group: IPAM_GROUP.to_string(),
            kind: GLOBAL_POOL_KIND.to_string(),
            name: name.into(),
        }
    }
}

/// Reference to an object in the same namespace, by name only
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    #[serde(default)]
    pub name: String,
}
