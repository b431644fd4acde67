//! IPAddressClaim lifecycle
//!
//! One claim per (cluster, role), named deterministically so that the hook
//! and the background reconciler converge on the same object. Creation is
//! the only synchronisation point between them: whoever loses the create
//! race re-reads and adopts the winner's claim.

use super::{Reconciler, VipRole};
use crate::error::ControllerError;
use chrono::Utc;
use crds::{
    Cluster, IPAddressClaim, IPAddressClaimSpec, TypedLocalObjectReference, CLUSTER_NAME_LABEL,
    REQUESTED_AT_ANNOTATION, ROLE_LABEL,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Namespace of a cluster, required for every claim operation.
pub(crate) fn cluster_namespace(cluster: &Cluster) -> Result<String, ControllerError> {
    cluster.namespace().ok_or_else(|| {
        ControllerError::InvalidResource(format!("Cluster {} has no namespace", cluster.name_any()))
    })
}

/// Build a new claim for `cluster` against `pool`.
pub fn build_claim(
    cluster: &Cluster,
    namespace: &str,
    role: VipRole,
    pool: &str,
    owner: Option<OwnerReference>,
) -> IPAddressClaim {
    let cluster_name = cluster.name_any();
    let labels = BTreeMap::from([
        (ROLE_LABEL.to_string(), role.as_str().to_string()),
        (CLUSTER_NAME_LABEL.to_string(), cluster_name.clone()),
    ]);
    let annotations = BTreeMap::from([(REQUESTED_AT_ANNOTATION.to_string(), Utc::now().to_rfc3339())]);

    IPAddressClaim {
        metadata: ObjectMeta {
            name: Some(role.claim_name(&cluster_name)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: owner.map(|o| vec![o]),
            ..Default::default()
        },
        spec: IPAddressClaimSpec {
            pool_ref: TypedLocalObjectReference::global_pool(pool),
        },
        status: None,
    }
}

impl Reconciler {
    /// Return the claim for (`cluster`, `role`), creating it if needed.
    ///
    /// An existing claim is adopted when `owner` is given and the claim has
    /// no owner yet. Fails with [`ControllerError::NoMatchingPool`] when a
    /// claim has to be created but no pool serves the cluster's class.
    pub async fn ensure_claim(
        &self,
        cluster: &Cluster,
        role: VipRole,
        owner: Option<OwnerReference>,
    ) -> Result<IPAddressClaim, ControllerError> {
        let namespace = cluster_namespace(cluster)?;
        let claim_name = role.claim_name(&cluster.name_any());

        if let Some(existing) = self.fetch_claim(&namespace, &claim_name).await? {
            debug!("IPAddressClaim {}/{} already exists", namespace, claim_name);
            return self.adopt_claim(existing, owner).await;
        }

        let class = cluster.class_name().ok_or_else(|| {
            ControllerError::InvalidResource(format!(
                "Cluster {}/{} has no topology class",
                namespace,
                cluster.name_any()
            ))
        })?;
        let pool = self
            .resolve_pool(class, role)
            .await?
            .ok_or_else(|| ControllerError::NoMatchingPool {
                class: class.to_string(),
                role: role.as_str().to_string(),
            })?;

        let claim = build_claim(cluster, &namespace, role, &pool, owner.clone());
        match self.client.create_claim(&claim).await {
            Ok(created) => {
                info!(
                    "Created IPAddressClaim {}/{} from pool {} for {} VIP (owner set: {})",
                    namespace,
                    claim_name,
                    pool,
                    role,
                    created.has_owner()
                );
                Ok(created)
            }
            Err(e) if e.is_already_exists() => {
                info!("IPAddressClaim {}/{} was created concurrently, using it", namespace, claim_name);
                let existing = self.fetch_claim(&namespace, &claim_name).await?.ok_or_else(|| {
                    ControllerError::backend(
                        format!("re-reading IPAddressClaim {}/{} after create race", namespace, claim_name),
                        e,
                    )
                })?;
                self.adopt_claim(existing, owner).await
            }
            Err(e) => Err(ControllerError::backend(
                format!(
                    "creating IPAddressClaim {}/{} in pool {} for {} VIP",
                    namespace, claim_name, pool, role
                ),
                e,
            )),
        }
    }

    /// Adopt an existing claim without ever creating one.
    ///
    /// Used when the VIP was already written (manually or by the hook) so a
    /// claim left behind by the hook still gets its owner reference.
    pub async fn adopt_existing_claim(
        &self,
        cluster: &Cluster,
        role: VipRole,
        owner: Option<OwnerReference>,
    ) -> Result<Option<IPAddressClaim>, ControllerError> {
        let namespace = cluster_namespace(cluster)?;
        let claim_name = role.claim_name(&cluster.name_any());

        match self.fetch_claim(&namespace, &claim_name).await? {
            Some(existing) => Ok(Some(self.adopt_claim(existing, owner).await?)),
            None => Ok(None),
        }
    }

    /// Read a claim, mapping not-found to `None`.
    pub(crate) async fn fetch_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<IPAddressClaim>, ControllerError> {
        match self.client.get_claim(namespace, name).await {
            Ok(claim) => Ok(Some(claim)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ControllerError::backend(
                format!("reading IPAddressClaim {}/{}", namespace, name),
                e,
            )),
        }
    }
}
