//! GlobalInClusterIPPool resource
//!
//! Cluster-scoped address pool served by the in-cluster IPAM provider.
//! The allocator never writes pools; it selects them by label.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "ipam.cluster.x-k8s.io",
    version = "v1alpha2",
    kind = "GlobalInClusterIPPool",
    status = "InClusterIPPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InClusterIPPoolSpec {
    /// Address ranges, CIDRs or single addresses
    #[serde(default)]
    pub addresses: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InClusterIPPoolStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_addresses: Option<PoolAddressCounts>,
}

/// Address usage reported by the IPAM provider
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoolAddressCounts {
    #[serde(default)]
    pub total: i64,

    #[serde(default)]
    pub used: i64,

    #[serde(default)]
    pub free: i64,
}
