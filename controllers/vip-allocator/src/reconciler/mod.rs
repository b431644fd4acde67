//! Allocation engine shared by the background reconciler and the runtime hook.
//!
//! The work is split by step, each adding methods to [`Reconciler`]:
//! - `pool`: label-based GlobalInClusterIPPool selection
//! - `claim`: idempotent IPAddressClaim creation
//! - `ownership`: owner-reference adoption of claims created without one
//! - `address`: following a claim to its bound IPAddress
//! - `endpoint`: writing the VIP back to the Cluster
//! - `cluster`: the per-role state machine driven by the controller

pub mod address;
pub mod claim;
pub mod cluster;
pub mod endpoint;
pub mod ownership;
pub mod pool;

#[cfg(test)]
mod claim_test;
#[cfg(test)]
mod endpoint_test;
#[cfg(test)]
mod pool_test;

use crate::config::ControllerConfig;
use crate::metrics::Metrics;
use capi_client::CapiClientTrait;
use std::fmt;

pub use address::AddressState;
pub use cluster::{RoleState, SkipReason};

/// Purpose of a VIP on a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VipRole {
    ControlPlane,
    Ingress,
}

impl VipRole {
    /// Order in which roles are reconciled for a cluster.
    pub const RECONCILE_ORDER: [VipRole; 2] = [VipRole::Ingress, VipRole::ControlPlane];

    /// Value used in pool and claim role labels.
    pub fn as_str(self) -> &'static str {
        match self {
            VipRole::ControlPlane => "control-plane",
            VipRole::Ingress => "ingress",
        }
    }

    /// Deterministic claim name for a cluster.
    pub fn claim_name(self, cluster_name: &str) -> String {
        match self {
            VipRole::ControlPlane => format!("vip-cp-{}", cluster_name),
            VipRole::Ingress => format!("vip-ingress-{}", cluster_name),
        }
    }
}

impl fmt::Display for VipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allocates VIPs for clusters.
pub struct Reconciler {
    pub(crate) client: Box<dyn CapiClientTrait + Send + Sync>,
    pub(crate) config: ControllerConfig,
    pub(crate) metrics: Metrics,
}

impl Reconciler {
    pub fn new(
        client: Box<dyn CapiClientTrait + Send + Sync>,
        config: ControllerConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
