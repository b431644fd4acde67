//! Leader election
//!
//! Optional `coordination.k8s.io` Lease so that only one replica runs the
//! background reconciler. The runtime extension and the probe server serve
//! on every replica; claim creation is idempotent, so a hook call on a
//! non-leader is still safe.
//!
//! The Lease spec is read and written through [`LeaseRecord`], a plain serde
//! view using RFC 3339 timestamps, and converted to the typed `Lease` only
//! at the API boundary.

use crate::config::LeaderElectionConfig;
use crate::error::ControllerError;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::PostParams;
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lease spec fields the election reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_duration_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "micro_time")]
    pub acquire_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "micro_time")]
    pub renew_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_transitions: Option<i32>,
}

/// `MicroTime` wire format: RFC 3339 with microseconds.
mod micro_time {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<DateTime<Utc>>::deserialize(deserializer)
    }
}

impl LeaseRecord {
    fn holder(&self) -> Option<&str> {
        self.holder_identity.as_deref().filter(|h| !h.is_empty())
    }

    /// Whether the current holder's lease has run out at `now`.
    fn expired(&self, now: DateTime<Utc>, default_duration: Duration) -> bool {
        let Some(renewed) = self.renew_time.or(self.acquire_time) else {
            return true;
        };
        let duration = self
            .lease_duration_seconds
            .and_then(|s| u64::try_from(s).ok())
            .map(Duration::from_secs)
            .unwrap_or(default_duration);
        match chrono::Duration::from_std(duration) {
            Ok(d) => renewed + d <= now,
            Err(_) => false,
        }
    }
}

/// Lease contents `identity` should write at `now`, or `None` while another
/// holder's lease is still valid.
pub fn next_record(current: &LeaseRecord, identity: &str, now: DateTime<Utc>, duration: Duration) -> Option<LeaseRecord> {
    let duration_seconds = i32::try_from(duration.as_secs()).unwrap_or(i32::MAX);

    match current.holder() {
        Some(holder) if holder == identity => Some(LeaseRecord {
            lease_duration_seconds: Some(duration_seconds),
            renew_time: Some(now),
            ..current.clone()
        }),
        Some(_) if !current.expired(now, duration) => None,
        previous => Some(LeaseRecord {
            holder_identity: Some(identity.to_string()),
            lease_duration_seconds: Some(duration_seconds),
            acquire_time: Some(now),
            renew_time: Some(now),
            lease_transitions: Some(
                current.lease_transitions.unwrap_or(0) + i32::from(previous.is_some()),
            ),
        }),
    }
}

/// Competes for and holds the Lease named by the config.
pub struct LeaderElector {
    api: Api<Lease>,
    config: LeaderElectionConfig,
}

impl LeaderElector {
    pub fn new(client: Client, config: LeaderElectionConfig) -> Self {
        let api = Api::namespaced(client, &config.namespace);
        Self { api, config }
    }

    fn lease_key(&self) -> String {
        format!("{}/{}", self.config.namespace, self.config.lease_name)
    }

    fn lease(&self, resource_version: Option<String>, record: &LeaseRecord) -> Result<Lease, ControllerError> {
        serde_json::from_value(json!({
            "apiVersion": "coordination.k8s.io/v1",
            "kind": "Lease",
            "metadata": {
                "name": self.config.lease_name,
                "namespace": self.config.namespace,
                "resourceVersion": resource_version,
            },
            "spec": record,
        }))
        .map_err(|e| ControllerError::InvalidResource(format!("Lease {}: {}", self.lease_key(), e)))
    }

    /// One acquire-or-renew attempt. `Ok(true)` when this replica holds the
    /// Lease afterwards; losing a write race is `Ok(false)`.
    pub async fn try_acquire_or_renew(&self) -> Result<bool, ControllerError> {
        let now = Utc::now();
        let existing = self.api.get_opt(&self.config.lease_name).await?;

        let (resource_version, current) = match &existing {
            Some(lease) => {
                let current = match &lease.spec {
                    Some(spec) => serde_json::to_value(spec)
                        .and_then(serde_json::from_value)
                        .map_err(|e| ControllerError::InvalidResource(format!("Lease {}: {}", self.lease_key(), e)))?,
                    None => LeaseRecord::default(),
                };
                (lease.metadata.resource_version.clone(), current)
            }
            None => (None, LeaseRecord::default()),
        };

        let Some(record) = next_record(&current, &self.config.identity, now, self.config.lease_duration) else {
            debug!(
                "Lease {} held by {}",
                self.lease_key(),
                current.holder_identity.as_deref().unwrap_or_default()
            );
            return Ok(false);
        };

        let lease = self.lease(resource_version, &record)?;
        let written = if existing.is_some() {
            self.api
                .replace(&self.config.lease_name, &PostParams::default(), &lease)
                .await
        } else {
            self.api.create(&PostParams::default(), &lease).await
        };

        match written {
            Ok(_) => {
                if current.holder() != Some(self.config.identity.as_str()) {
                    info!(
                        "Acquired Lease {} as {} at {}",
                        self.lease_key(),
                        self.config.identity,
                        now.to_rfc3339_opts(SecondsFormat::Secs, true)
                    );
                }
                Ok(true)
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!("Lost write race on Lease {}", self.lease_key());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Block until this replica holds the Lease.
    pub async fn acquire(&self) -> Result<(), ControllerError> {
        info!(
            "Waiting for leadership on Lease {} as {}",
            self.lease_key(),
            self.config.identity
        );
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => warn!("Failed to acquire Lease {}: {}", self.lease_key(), e),
            }
            tokio::time::sleep(self.config.retry_period).await;
        }
    }

    /// Keep renewing the Lease. Returns once leadership is lost, either to
    /// another holder or because renewal kept failing past the renew deadline.
    pub async fn hold(&self) -> ControllerError {
        let mut renewed = Instant::now();
        loop {
            tokio::time::sleep(self.config.retry_period).await;
            match self.try_acquire_or_renew().await {
                Ok(true) => renewed = Instant::now(),
                Ok(false) => {
                    return ControllerError::Watch(format!("Lease {} taken over by another replica", self.lease_key()));
                }
                Err(e) => warn!("Failed to renew Lease {}: {}", self.lease_key(), e),
            }
            if renewed.elapsed() > self.config.renew_deadline {
                return ControllerError::Watch(format!(
                    "Lease {} not renewed within {:?}",
                    self.lease_key(),
                    self.config.renew_deadline
                ));
            }
        }
    }
}
