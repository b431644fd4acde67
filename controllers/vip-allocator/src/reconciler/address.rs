//! Address resolution
//!
//! A claim is bound once the IPAM provider has written
//! `status.addressRef.name` and the referenced IPAddress carries an address.

use super::{Reconciler, VipRole};
use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use crds::{IPAddressClaim, REQUESTED_AT_ANNOTATION};
use kube::ResourceExt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of following a claim to its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressState {
    /// Not bound yet
    Pending,
    /// Bound to this address
    Ready(String),
}

/// When the claim was first requested, from its annotation.
pub fn requested_at(claim: &IPAddressClaim) -> Option<DateTime<Utc>> {
    claim
        .annotations()
        .get(REQUESTED_AT_ANNOTATION)
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Time elapsed since the claim was requested, if known.
pub fn pending_for(claim: &IPAddressClaim, now: DateTime<Utc>) -> Option<Duration> {
    requested_at(claim).and_then(|t| (now - t).to_std().ok())
}

impl Reconciler {
    /// Single read of the address bound to `claim`.
    pub async fn resolve_address(
        &self,
        namespace: &str,
        claim: &IPAddressClaim,
    ) -> Result<AddressState, ControllerError> {
        let Some(address_name) = claim.bound_address_name() else {
            return Ok(AddressState::Pending);
        };

        match self.client.get_ip_address(namespace, address_name).await {
            Ok(ip) if !ip.spec.address.is_empty() => Ok(AddressState::Ready(ip.spec.address)),
            Ok(_) => Ok(AddressState::Pending),
            Err(e) if e.is_not_found() => {
                debug!(
                    "IPAddress {}/{} referenced by claim {} not found yet",
                    namespace,
                    address_name,
                    claim.name_any()
                );
                Ok(AddressState::Pending)
            }
            Err(e) => Err(ControllerError::backend(
                format!(
                    "reading IPAddress {}/{} for claim {}",
                    namespace,
                    address_name,
                    claim.name_any()
                ),
                e,
            )),
        }
    }

    /// Report a claim that has been pending longer than the configured limit.
    ///
    /// Returns whether the claim is considered stalled. The claim is kept
    /// either way.
    pub fn check_pending_age(&self, claim: &IPAddressClaim, role: VipRole, class: &str) -> bool {
        let Some(age) = pending_for(claim, Utc::now()) else {
            return false;
        };
        if age <= self.config.max_pending_age {
            return false;
        }
        warn!(
            "IPAddressClaim {}/{} has been waiting for an address for {}s (limit {}s); check the IPAM provider and pool {}",
            claim.namespace().unwrap_or_default(),
            claim.name_any(),
            age.as_secs(),
            self.config.max_pending_age.as_secs(),
            claim.spec.pool_ref.name
        );
        self.metrics.record_stalled_claim(role.as_str(), class);
        true
    }

    /// Poll until the claim is bound or `deadline` passes.
    ///
    /// The deadline belongs to the whole hook request, so several claims
    /// polled in one request share it. A missing claim is treated as
    /// not-yet-visible and polled again; any other read error aborts the wait.
    pub async fn wait_for_address(
        &self,
        namespace: &str,
        claim_name: &str,
        deadline: Instant,
    ) -> Result<String, ControllerError> {
        let interval = self.config.hook_poll_interval;

        loop {
            match self.client.get_claim(namespace, claim_name).await {
                Ok(claim) => {
                    if let AddressState::Ready(address) = self.resolve_address(namespace, &claim).await? {
                        info!("IPAddressClaim {}/{} bound to {}", namespace, claim_name, address);
                        return Ok(address);
                    }
                    debug!("IPAddressClaim {}/{} not bound yet", namespace, claim_name);
                }
                Err(e) if e.is_not_found() => {
                    debug!("IPAddressClaim {}/{} not visible yet", namespace, claim_name);
                }
                Err(e) => {
                    return Err(ControllerError::backend(
                        format!("polling IPAddressClaim {}/{}", namespace, claim_name),
                        e,
                    ));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ControllerError::AllocationTimeout {
                    claim: format!("{}/{}", namespace, claim_name),
                    timeout: self.config.hook_poll_timeout,
                });
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }
}
