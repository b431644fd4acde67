//! Test utilities for unit testing the reconciler and the hook
//!
//! This module provides helpers for creating test resources and a
//! reconciler wired to the in-memory `MockCapiClient`.

#[cfg(test)]
use crate::config::ControllerConfig;
#[cfg(test)]
use crate::metrics::Metrics;
#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use capi_client::MockCapiClient;
#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::time::Duration;

#[cfg(test)]
pub const TEST_NAMESPACE: &str = "default";

/// Config with short hook polling so timeout tests finish quickly
#[cfg(test)]
pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        hook_poll_interval: Duration::from_millis(10),
        hook_poll_timeout: Duration::from_millis(200),
        hook_timeout: Duration::from_secs(1),
        ..ControllerConfig::default()
    }
}

/// Polling deadline a fresh hook request would get under `test_config`
#[cfg(test)]
pub fn hook_deadline() -> tokio::time::Instant {
    tokio::time::Instant::now() + test_config().hook_poll_timeout
}

/// Reconciler backed by (a clone of) `mock`
#[cfg(test)]
pub fn create_test_reconciler(mock: &MockCapiClient) -> Reconciler {
    Reconciler::new(
        Box::new(mock.clone()),
        test_config(),
        Metrics::new().unwrap(),
    )
}

/// Helper to create a test Cluster using a ClusterClass, not yet stored (no uid)
#[cfg(test)]
pub fn create_test_cluster(name: &str, class: &str) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: ClusterSpec {
            control_plane_endpoint: ApiEndpoint::default(),
            topology: Some(Topology {
                class: class.to_string(),
                version: Some("v1.30.2".to_string()),
                variables: vec![],
            }),
        },
    }
}

/// Helper to create a stored test Cluster (has a uid, so it can own claims)
#[cfg(test)]
pub fn create_stored_cluster(name: &str, class: &str) -> Cluster {
    let mut cluster = create_test_cluster(name, class);
    cluster.metadata.uid = Some(format!("uid-{}", name));
    cluster
}

/// Owner reference a stored cluster puts on its claims
#[cfg(test)]
pub fn cluster_owner(cluster: &Cluster) -> OwnerReference {
    use kube::Resource;
    cluster.controller_owner_ref(&()).unwrap()
}

/// Helper to create a test GlobalInClusterIPPool with comma-separated selectors
#[cfg(test)]
pub fn create_test_pool(name: &str, classes: Option<&str>, roles: Option<&str>) -> GlobalInClusterIPPool {
    let mut labels = BTreeMap::new();
    if let Some(classes) = classes {
        labels.insert(CLUSTER_CLASS_LABEL.to_string(), classes.to_string());
    }
    if let Some(roles) = roles {
        labels.insert(ROLE_LABEL.to_string(), roles.to_string());
    }
    GlobalInClusterIPPool {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: InClusterIPPoolSpec {
            addresses: vec!["10.0.0.10-10.0.0.20".to_string()],
            prefix: Some(24),
            gateway: Some("10.0.0.1".to_string()),
        },
        status: Some(InClusterIPPoolStatus {
            ip_addresses: Some(PoolAddressCounts { total: 11, used: 0, free: 11 }),
        }),
    }
}

/// Helper to create a test ClusterClass declaring the given variables
#[cfg(test)]
pub fn create_test_cluster_class(name: &str, namespace: Option<&str>, variables: &[&str]) -> ClusterClass {
    ClusterClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(|s| s.to_string()),
            ..Default::default()
        },
        spec: ClusterClassSpec {
            variables: variables
                .iter()
                .map(|v| ClusterClassVariable {
                    name: v.to_string(),
                    required: false,
                    schema: None,
                })
                .collect(),
        },
    }
}

/// Helper to create a claim as another writer (e.g. the hook) would have left it
#[cfg(test)]
pub fn create_test_claim(cluster_name: &str, claim_name: &str, pool: &str) -> IPAddressClaim {
    IPAddressClaim {
        metadata: ObjectMeta {
            name: Some(claim_name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([
                (ROLE_LABEL.to_string(), "control-plane".to_string()),
                (CLUSTER_NAME_LABEL.to_string(), cluster_name.to_string()),
            ])),
            ..Default::default()
        },
        spec: IPAddressClaimSpec {
            pool_ref: TypedLocalObjectReference::global_pool(pool),
        },
        status: None,
    }
}
