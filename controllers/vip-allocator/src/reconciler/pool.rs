//! GlobalInClusterIPPool selection
//!
//! Pools advertise the cluster classes and roles they serve through two
//! labels whose values may be comma-separated lists, e.g.
//! `vip.capi.gorizond.io/cluster-class: "rke2,rke2-ha"`. Kubernetes label
//! selectors cannot match list members, so all pools are listed and filtered
//! here.

use super::{Reconciler, VipRole};
use crate::error::ControllerError;
use crds::{GlobalInClusterIPPool, CLUSTER_CLASS_LABEL, ROLE_LABEL};
use kube::ResourceExt;
use tracing::{debug, info};

/// Whether a comma-separated label value lists `wanted`.
fn label_lists(pool: &GlobalInClusterIPPool, key: &str, wanted: &str) -> bool {
    pool.labels()
        .get(key)
        .is_some_and(|value| value.split(',').map(str::trim).any(|v| !v.is_empty() && v == wanted))
}

/// Whether a pool serves the given cluster class and role.
pub fn pool_matches(pool: &GlobalInClusterIPPool, class: &str, role: &str) -> bool {
    label_lists(pool, CLUSTER_CLASS_LABEL, class) && label_lists(pool, ROLE_LABEL, role)
}

impl Reconciler {
    /// Find the pool serving `class` and `role`.
    ///
    /// Returns `Ok(None)` when no pool matches; when several match, the
    /// lexicographically smallest name wins.
    pub async fn resolve_pool(&self, class: &str, role: VipRole) -> Result<Option<String>, ControllerError> {
        let pools = self.client.list_global_pools().await.map_err(|e| {
            ControllerError::backend(
                format!("listing GlobalInClusterIPPools for class {} role {}", class, role),
                e,
            )
        })?;

        for pool in &pools {
            if let Some(counts) = pool.status.as_ref().and_then(|s| s.ip_addresses.as_ref()) {
                self.metrics.set_pool_addresses(&pool.name_any(), counts);
            }
        }

        let mut matching: Vec<String> = pools
            .iter()
            .filter(|p| pool_matches(p, class, role.as_str()))
            .map(|p| p.name_any())
            .collect();
        matching.sort();
        self.metrics.set_pools_available(class, role.as_str(), matching.len());

        match matching.into_iter().next() {
            Some(name) => {
                debug!("Pool {} selected for class {} role {}", name, class, role);
                Ok(Some(name))
            }
            None => {
                info!("No GlobalInClusterIPPool labelled for class {} role {} (checked {} pools)", class, role, pools.len());
                Ok(None)
            }
        }
    }
}
