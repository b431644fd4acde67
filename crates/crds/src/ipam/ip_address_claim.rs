//! IPAddressClaim resource
//!
//! Requests one address from a pool. The IPAM provider fills in
//! `status.addressRef` once an `IPAddress` has been bound.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::references::{LocalObjectReference, TypedLocalObjectReference};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "ipam.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "IPAddressClaim",
    namespaced,
    status = "IPAddressClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressClaimSpec {
    /// Pool the address is requested from
    pub pool_ref: TypedLocalObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressClaimStatus {
    /// Bound IPAddress, set by the IPAM provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_ref: Option<LocalObjectReference>,

    /// Provider conditions, kept opaque
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<serde_json::Value>,
}

impl IPAddressClaim {
    /// Name of the bound IPAddress, if the provider has set one.
    pub fn bound_address_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.address_ref.as_ref())
            .map(|r| r.name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// Whether any owner reference is present.
    pub fn has_owner(&self) -> bool {
        self.metadata
            .owner_references
            .as_ref()
            .is_some_and(|refs| !refs.is_empty())
    }
}
