//! Owner-reference adoption
//!
//! The hook may create a claim before its Cluster is stored, so the claim
//! starts without an owner. The first caller that has the Cluster's uid
//! sets the owner so that deleting the Cluster garbage-collects the claim
//! and releases the address.

use super::Reconciler;
use crate::error::ControllerError;
use crds::IPAddressClaim;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use tracing::{debug, info};

impl Reconciler {
    /// Set `owner` on a claim that has no owner references.
    ///
    /// Claims that already have an owner are returned untouched. The update
    /// is guarded by the claim's resourceVersion; a conflict is returned as
    /// a retryable error.
    pub async fn adopt_claim(
        &self,
        claim: IPAddressClaim,
        owner: Option<OwnerReference>,
    ) -> Result<IPAddressClaim, ControllerError> {
        let Some(owner) = owner else {
            return Ok(claim);
        };
        if claim.has_owner() {
            debug!("IPAddressClaim {} already owned", claim.name_any());
            return Ok(claim);
        }

        let namespace = claim.namespace().unwrap_or_default();
        let name = claim.name_any();
        let mut adopted = claim;
        adopted.metadata.owner_references = Some(vec![owner.clone()]);

        let updated = self.client.replace_claim(&adopted).await.map_err(|e| {
            ControllerError::backend(
                format!("adopting IPAddressClaim {}/{} for {} {}", namespace, name, owner.kind, owner.name),
                e,
            )
        })?;
        info!("Adopted IPAddressClaim {}/{} into {} {}", namespace, name, owner.kind, owner.name);
        Ok(updated)
    }
}
