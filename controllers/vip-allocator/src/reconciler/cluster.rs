//! Per-cluster reconcile
//!
//! Each role goes through `NoClaim -> ClaimPending -> Bound`, or is skipped
//! when disabled or already set. Role results are folded into one
//! controller action: a retryable error wins over a pending claim, which
//! wins over a configuration error, which waits for the next change.

use super::address::{pending_for, AddressState};
use super::claim::cluster_namespace;
use super::{Reconciler, VipRole};
use crate::error::ControllerError;
use chrono::Utc;
use crds::Cluster;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why a role was not allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `<role>-enabled: "false"` annotation
    Disabled,
    /// VIP already present on the cluster
    AlreadySet,
}

/// Result of reconciling one role of one cluster.
#[derive(Debug)]
pub enum RoleState {
    Skipped(SkipReason),
    /// Claim exists but has no address yet
    ClaimPending,
    /// VIP written to the cluster
    Bound(String),
    Error(ControllerError),
}

impl Reconciler {
    /// Reconcile all roles of a cluster and decide when to look at it again.
    pub async fn reconcile_cluster(&self, cluster: &Cluster) -> Result<Action, ControllerError> {
        let started = Instant::now();
        let Some(class) = cluster.class_name().map(str::to_string) else {
            debug!(
                "Cluster {}/{} has no topology class, ignoring",
                cluster.namespace().unwrap_or_default(),
                cluster.name_any()
            );
            return Ok(Action::await_change());
        };

        let mut current = cluster.clone();
        let mut states = Vec::with_capacity(VipRole::RECONCILE_ORDER.len());
        for role in VipRole::RECONCILE_ORDER {
            let state = self.reconcile_role(&mut current, &class, role).await;
            states.push((role, state));
        }

        let (result, label) = self.fold_role_states(&current, states);
        self.metrics.record_reconcile(&class, label, started.elapsed());
        result
    }

    fn fold_role_states(
        &self,
        cluster: &Cluster,
        states: Vec<(VipRole, RoleState)>,
    ) -> (Result<Action, ControllerError>, &'static str) {
        let mut retryable = None;
        let mut pending = false;
        let mut config_error = None;

        for (role, state) in states {
            match state {
                RoleState::Error(e) if e.is_retryable() => {
                    if retryable.is_none() {
                        retryable = Some(e);
                    }
                }
                RoleState::Error(e) => {
                    warn!(
                        "{} VIP for Cluster {}/{} not allocated: {}",
                        role,
                        cluster.namespace().unwrap_or_default(),
                        cluster.name_any(),
                        e
                    );
                    config_error.get_or_insert(e);
                }
                RoleState::ClaimPending => pending = true,
                RoleState::Bound(_) | RoleState::Skipped(_) => {}
            }
        }

        if let Some(e) = retryable {
            return (Err(e), "error");
        }
        if pending {
            return (Ok(Action::requeue(self.config.requeue_delay)), "pending");
        }
        if config_error.is_some() {
            return (Ok(Action::await_change()), "config_error");
        }
        (Ok(Action::await_change()), "done")
    }

    /// Drive one role through its state machine.
    ///
    /// `cluster` is replaced with the patched object when a VIP is written, so
    /// the next role diffs against fresh state.
    pub async fn reconcile_role(&self, cluster: &mut Cluster, class: &str, role: VipRole) -> RoleState {
        let namespace = cluster.namespace().unwrap_or_default();
        let name = cluster.name_any();

        let enabled_key = match role {
            VipRole::ControlPlane => &self.config.control_plane_enabled_annotation,
            VipRole::Ingress => &self.config.ingress_enabled_annotation,
        };
        if cluster
            .annotation(enabled_key)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
        {
            debug!("{} VIP disabled for Cluster {}/{}", role, namespace, name);
            return RoleState::Skipped(SkipReason::Disabled);
        }

        let owner = cluster.controller_owner_ref(&());
        let existing = match role {
            VipRole::ControlPlane => Some(cluster.spec.control_plane_endpoint.host.as_str()),
            VipRole::Ingress => cluster.annotation(&self.config.ingress_vip_annotation),
        }
        .filter(|v| !v.is_empty())
        .map(str::to_string);

        if let Some(value) = existing {
            debug!("{} VIP of Cluster {}/{} already set to {}", role, namespace, name, value);
            return match self.adopt_existing_claim(cluster, role, owner).await {
                Ok(_) => RoleState::Skipped(SkipReason::AlreadySet),
                Err(e) => self.role_error(role, class, e),
            };
        }

        let claim = match self.ensure_claim(cluster, role, owner).await {
            Ok(claim) => claim,
            Err(e) => return self.role_error(role, class, e),
        };
        let claim_namespace = match cluster_namespace(cluster) {
            Ok(ns) => ns,
            Err(e) => return self.role_error(role, class, e),
        };

        let address = match self.resolve_address(&claim_namespace, &claim).await {
            Ok(AddressState::Ready(address)) => address,
            Ok(AddressState::Pending) => {
                info!(
                    "Waiting for IPAM provider to bind IPAddressClaim {}/{}",
                    claim_namespace,
                    claim.name_any()
                );
                self.check_pending_age(&claim, role, class);
                return RoleState::ClaimPending;
            }
            Err(e) => return self.role_error(role, class, e),
        };

        let patched = match role {
            VipRole::ControlPlane => self.patch_control_plane_endpoint(cluster, &address).await,
            VipRole::Ingress => self.patch_ingress_vip(cluster, &address).await,
        };
        match patched {
            Ok(updated) => {
                *cluster = updated;
                self.metrics
                    .record_allocation(role.as_str(), class, pending_for(&claim, Utc::now()));
                RoleState::Bound(address)
            }
            Err(e) => self.role_error(role, class, e),
        }
    }

    fn role_error(&self, role: VipRole, class: &str, error: ControllerError) -> RoleState {
        self.metrics
            .record_allocation_error(role.as_str(), class, error.reason());
        RoleState::Error(error)
    }
}
