//! Runtime configuration
//!
//! Read once at startup from environment variables. Every setting has a
//! default so the allocator runs unconfigured in a standard install.

use crate::error::ControllerError;
use crds::{CONTROL_PLANE_ENABLED_ANNOTATION, INGRESS_ENABLED_ANNOTATION, INGRESS_VIP_ANNOTATION};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Largest handler timeout Cluster API accepts at registration
pub const MAX_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the Lease used when leader election is enabled
pub const DEFAULT_LEADER_ELECTION_ID: &str = "capi-vip-allocator.gorizond.io";

/// Lease settings for running several replicas of the background reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderElectionConfig {
    pub lease_name: String,
    pub namespace: String,
    /// This replica's holder identity (pod name by default)
    pub identity: String,
    pub lease_duration: Duration,
    /// Give up leadership when renewal has failed for this long
    pub renew_deadline: Duration,
    pub retry_period: Duration,
}

/// Settings shared by the background reconciler and the runtime extension.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Port written to `controlPlaneEndpoint.port` when it is unset
    pub default_port: i32,
    /// Delay before re-checking a pending claim or retrying an error
    pub requeue_delay: Duration,
    pub hook_poll_interval: Duration,
    /// How long the hook waits for a claim to be bound
    pub hook_poll_timeout: Duration,
    /// Timeout advertised to Cluster API for the GeneratePatches handler
    pub hook_timeout: Duration,
    /// Age after which an unbound claim is reported as stalled
    pub max_pending_age: Duration,
    pub enable_reconciler: bool,
    pub enable_runtime_extension: bool,
    pub hook_bind_address: SocketAddr,
    pub metrics_bind_address: SocketAddr,
    pub extension_name: String,
    /// Topology variable that receives the VIP when the class declares it
    pub vip_variable_name: String,
    pub ingress_vip_annotation: String,
    pub ingress_enabled_annotation: String,
    pub control_plane_enabled_annotation: String,
    /// Namespace to watch; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// `None` runs the reconciler without leader election
    pub leader_election: Option<LeaderElectionConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_port: 6443,
            requeue_delay: Duration::from_secs(10),
            hook_poll_interval: Duration::from_millis(500),
            hook_poll_timeout: Duration::from_secs(25),
            hook_timeout: Duration::from_secs(30),
            max_pending_age: Duration::from_secs(600),
            enable_reconciler: true,
            enable_runtime_extension: true,
            hook_bind_address: SocketAddr::from(([0, 0, 0, 0], 9443)),
            metrics_bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            extension_name: "vip-allocator".to_string(),
            vip_variable_name: "clusterVip".to_string(),
            ingress_vip_annotation: INGRESS_VIP_ANNOTATION.to_string(),
            ingress_enabled_annotation: INGRESS_ENABLED_ANNOTATION.to_string(),
            control_plane_enabled_annotation: CONTROL_PLANE_ENABLED_ANNOTATION.to_string(),
            watch_namespace: None,
            leader_election: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup and validate it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            default_port: parse(&get, "DEFAULT_PORT", defaults.default_port)?,
            requeue_delay: Duration::from_secs(parse(&get, "REQUEUE_DELAY_SECS", defaults.requeue_delay.as_secs())?),
            hook_poll_interval: Duration::from_millis(parse(
                &get,
                "HOOK_POLL_INTERVAL_MS",
                defaults.hook_poll_interval.as_millis() as u64,
            )?),
            hook_poll_timeout: Duration::from_secs(parse(
                &get,
                "HOOK_POLL_TIMEOUT_SECS",
                defaults.hook_poll_timeout.as_secs(),
            )?),
            hook_timeout: Duration::from_secs(parse(&get, "HOOK_TIMEOUT_SECS", defaults.hook_timeout.as_secs())?),
            max_pending_age: Duration::from_secs(parse(
                &get,
                "MAX_PENDING_AGE_SECS",
                defaults.max_pending_age.as_secs(),
            )?),
            enable_reconciler: parse_bool(&get, "ENABLE_RECONCILER", defaults.enable_reconciler)?,
            enable_runtime_extension: parse_bool(
                &get,
                "ENABLE_RUNTIME_EXTENSION",
                defaults.enable_runtime_extension,
            )?,
            hook_bind_address: parse(&get, "HOOK_BIND_ADDRESS", defaults.hook_bind_address)?,
            metrics_bind_address: parse(&get, "METRICS_BIND_ADDRESS", defaults.metrics_bind_address)?,
            extension_name: get("EXTENSION_NAME").unwrap_or(defaults.extension_name),
            vip_variable_name: get("VIP_VARIABLE_NAME").unwrap_or(defaults.vip_variable_name),
            ingress_vip_annotation: get("INGRESS_VIP_ANNOTATION").unwrap_or(defaults.ingress_vip_annotation),
            ingress_enabled_annotation: get("INGRESS_ENABLED_ANNOTATION")
                .unwrap_or(defaults.ingress_enabled_annotation),
            control_plane_enabled_annotation: get("CONTROL_PLANE_ENABLED_ANNOTATION")
                .unwrap_or(defaults.control_plane_enabled_annotation),
            watch_namespace: get("WATCH_NAMESPACE"),
            leader_election: if parse_bool(&get, "LEADER_ELECT", false)? {
                Some(LeaderElectionConfig {
                    lease_name: get("LEADER_ELECTION_ID").unwrap_or_else(|| DEFAULT_LEADER_ELECTION_ID.to_string()),
                    namespace: get("LEADER_ELECTION_NAMESPACE")
                        .or_else(|| get("POD_NAMESPACE"))
                        .unwrap_or_else(|| "default".to_string()),
                    identity: get("POD_NAME")
                        .or_else(|| get("HOSTNAME"))
                        .unwrap_or_else(|| format!("capi-vip-allocator-{}", std::process::id())),
                    lease_duration: Duration::from_secs(parse(&get, "LEASE_DURATION_SECS", 15)?),
                    renew_deadline: Duration::from_secs(parse(&get, "RENEW_DEADLINE_SECS", 10)?),
                    retry_period: Duration::from_secs(parse(&get, "LEASE_RETRY_PERIOD_SECS", 2)?),
                })
            } else {
                None
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if !(1..=65535).contains(&self.default_port) {
            return Err(ControllerError::InvalidConfig(format!(
                "DEFAULT_PORT must be between 1 and 65535, got {}",
                self.default_port
            )));
        }
        if self.hook_poll_interval.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "HOOK_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        if self.hook_timeout.is_zero() || self.hook_timeout > MAX_HOOK_TIMEOUT {
            return Err(ControllerError::InvalidConfig(format!(
                "HOOK_TIMEOUT_SECS must be between 1 and {}, got {}",
                MAX_HOOK_TIMEOUT.as_secs(),
                self.hook_timeout.as_secs()
            )));
        }
        if self.hook_poll_timeout >= self.hook_timeout {
            return Err(ControllerError::InvalidConfig(format!(
                "HOOK_POLL_TIMEOUT_SECS ({:?}) must be shorter than HOOK_TIMEOUT_SECS ({:?})",
                self.hook_poll_timeout, self.hook_timeout
            )));
        }
        if self.requeue_delay.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "REQUEUE_DELAY_SECS must be greater than zero".to_string(),
            ));
        }
        if self.extension_name.contains('.') {
            return Err(ControllerError::InvalidConfig(format!(
                "EXTENSION_NAME must not contain dots, got {:?}",
                self.extension_name
            )));
        }
        if let Some(election) = &self.leader_election {
            if election.retry_period.is_zero()
                || election.retry_period >= election.renew_deadline
                || election.renew_deadline >= election.lease_duration
            {
                return Err(ControllerError::InvalidConfig(format!(
                    "leader election needs LEASE_RETRY_PERIOD_SECS ({:?}) < RENEW_DEADLINE_SECS ({:?}) < LEASE_DURATION_SECS ({:?})",
                    election.retry_period, election.renew_deadline, election.lease_duration
                )));
            }
        }
        if !self.enable_reconciler && !self.enable_runtime_extension {
            return Err(ControllerError::InvalidConfig(
                "at least one of ENABLE_RECONCILER and ENABLE_RUNTIME_EXTENSION must be true".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool, ControllerError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no") => Ok(false),
        Some(v) => Err(ControllerError::InvalidConfig(format!(
            "{} must be a boolean, got {:?}",
            key, v
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ControllerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.default_port, 6443);
        assert_eq!(config.requeue_delay, Duration::from_secs(10));
        assert_eq!(config.hook_poll_interval, Duration::from_millis(500));
        assert_eq!(config.hook_poll_timeout, Duration::from_secs(25));
        assert_eq!(config.vip_variable_name, "clusterVip");
        assert_eq!(config.ingress_vip_annotation, INGRESS_VIP_ANNOTATION);
        assert!(config.enable_reconciler);
        assert!(config.enable_runtime_extension);
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = load(&[
            ("DEFAULT_PORT", "8443"),
            ("REQUEUE_DELAY_SECS", "3"),
            ("ENABLE_RUNTIME_EXTENSION", "false"),
            ("WATCH_NAMESPACE", "capi-clusters"),
            ("METRICS_BIND_ADDRESS", "127.0.0.1:9090"),
            ("VIP_VARIABLE_NAME", "apiServerVip"),
        ])
        .unwrap();
        assert_eq!(config.default_port, 8443);
        assert_eq!(config.requeue_delay, Duration::from_secs(3));
        assert!(!config.enable_runtime_extension);
        assert_eq!(config.watch_namespace.as_deref(), Some("capi-clusters"));
        assert_eq!(config.metrics_bind_address.port(), 9090);
        assert_eq!(config.vip_variable_name, "apiServerVip");
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = load(&[("DEFAULT_PORT", "  "), ("WATCH_NAMESPACE", "")]).unwrap();
        assert_eq!(config.default_port, 6443);
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = load(&[("DEFAULT_PORT", "https")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("DEFAULT_PORT")));
    }

    #[test]
    fn test_poll_timeout_must_be_below_hook_timeout() {
        let err = load(&[("HOOK_POLL_TIMEOUT_SECS", "30"), ("HOOK_TIMEOUT_SECS", "30")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_hook_timeout_capped_at_registration_limit() {
        assert!(load(&[("HOOK_TIMEOUT_SECS", "30")]).is_ok());

        let err = load(&[("HOOK_POLL_TIMEOUT_SECS", "50"), ("HOOK_TIMEOUT_SECS", "60")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("HOOK_TIMEOUT_SECS")));

        assert!(load(&[("HOOK_POLL_TIMEOUT_SECS", "0"), ("HOOK_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn test_port_range_and_interval_validated() {
        assert!(load(&[("DEFAULT_PORT", "0")]).is_err());
        assert!(load(&[("DEFAULT_PORT", "70000")]).is_err());
        assert!(load(&[("HOOK_POLL_INTERVAL_MS", "0")]).is_err());
        assert!(load(&[("ENABLE_RECONCILER", "maybe")]).is_err());
    }

    #[test]
    fn test_leader_election_off_by_default() {
        assert_eq!(load(&[]).unwrap().leader_election, None);
    }

    #[test]
    fn test_leader_election_settings() {
        let config = load(&[
            ("LEADER_ELECT", "true"),
            ("POD_NAMESPACE", "capi-system"),
            ("POD_NAME", "vip-allocator-7d9f"),
            ("HOSTNAME", "ignored"),
        ])
        .unwrap();

        let election = config.leader_election.unwrap();
        assert_eq!(election.lease_name, "capi-vip-allocator.gorizond.io");
        assert_eq!(election.namespace, "capi-system");
        assert_eq!(election.identity, "vip-allocator-7d9f");
        assert_eq!(election.lease_duration, Duration::from_secs(15));
        assert_eq!(election.renew_deadline, Duration::from_secs(10));
        assert_eq!(election.retry_period, Duration::from_secs(2));
    }

    #[test]
    fn test_leader_election_timings_validated() {
        let err = load(&[("LEADER_ELECT", "1"), ("RENEW_DEADLINE_SECS", "20")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("RENEW_DEADLINE_SECS")));
        assert!(load(&[("LEADER_ELECT", "1"), ("LEASE_RETRY_PERIOD_SECS", "0")]).is_err());
    }

    #[test]
    fn test_both_entry_points_disabled_is_rejected() {
        let err = load(&[("ENABLE_RECONCILER", "false"), ("ENABLE_RUNTIME_EXTENSION", "0")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
