//! IPAddress resource
//!
//! Written by the IPAM provider when it binds an address to a claim.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::references::{LocalObjectReference, TypedLocalObjectReference};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "ipam.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "IPAddress",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressSpec {
    #[serde(default)]
    pub claim_ref: LocalObjectReference,

    #[serde(default)]
    pub pool_ref: TypedLocalObjectReference,

    /// The bound address, e.g. "10.0.0.15"
    #[serde(default)]
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}
