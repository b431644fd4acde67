//! Mock CapiClient for unit testing
//!
//! In-memory implementation of [`CapiClientTrait`] that behaves like the API
//! server for the operations the allocator uses: resourceVersion checks on
//! replace, already-exists on duplicate create, merge-patch semantics on
//! cluster patches. Tests drive the IPAM provider side by hand through the
//! `bind_*` helpers and can inject races and failures.

use crate::capi_trait::CapiClientTrait;
use crate::common::apply_merge_patch;
use crate::error::CapiError;
use crds::{
    Cluster, ClusterClass, GlobalInClusterIPPool, IPAddress, IPAddressClaim, IPAddressClaimStatus,
    IPAddressSpec, LocalObjectReference,
};
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Mock CapiClient for testing
///
/// Clones share the same storage, so a test can keep a handle while the code
/// under test owns another.
#[derive(Clone, Default)]
pub struct MockCapiClient {
    pub(crate) clusters: Arc<Mutex<HashMap<Key, Cluster>>>,
    // Keyed by namespace, "" for lookups without one
    pub(crate) cluster_classes: Arc<Mutex<HashMap<Key, ClusterClass>>>,
    pub(crate) pools: Arc<Mutex<HashMap<String, GlobalInClusterIPPool>>>,
    pub(crate) claims: Arc<Mutex<HashMap<Key, IPAddressClaim>>>,
    pub(crate) ip_addresses: Arc<Mutex<HashMap<Key, IPAddress>>>,
    pub(crate) resource_version: Arc<Mutex<u64>>,

    // Failure and race injection
    pub(crate) create_race: Arc<Mutex<Option<IPAddressClaim>>>,
    pub(crate) list_pools_error: Arc<Mutex<Option<String>>>,
    pub(crate) claim_read_failures: Arc<Mutex<u32>>,
    pub(crate) replace_conflicts: Arc<Mutex<u32>>,
    pub(crate) deferred_binds: Arc<Mutex<HashMap<Key, (String, u32)>>>,

    // Call recording
    pub(crate) create_claim_calls: Arc<Mutex<u32>>,
    pub(crate) replace_claim_calls: Arc<Mutex<u32>>,
    pub(crate) cluster_patches: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl MockCapiClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_resource_version(&self) -> String {
        let mut rv = self.resource_version.lock().unwrap();
        *rv += 1;
        rv.to_string()
    }

    /// Add a cluster to the mock store (for test setup)
    pub fn add_cluster(&self, mut cluster: Cluster) {
        cluster.metadata.resource_version = Some(self.next_resource_version());
        let k = key(&cluster.namespace().unwrap_or_default(), &cluster.name_any());
        self.clusters.lock().unwrap().insert(k, cluster);
    }

    /// Add a ClusterClass; classes without a namespace answer un-namespaced lookups
    pub fn add_cluster_class(&self, class: ClusterClass) {
        let k = key(&class.namespace().unwrap_or_default(), &class.name_any());
        self.cluster_classes.lock().unwrap().insert(k, class);
    }

    /// Add a pool to the mock store (for test setup)
    pub fn add_pool(&self, pool: GlobalInClusterIPPool) {
        self.pools.lock().unwrap().insert(pool.name_any(), pool);
    }

    /// Add a pre-existing claim (for test setup)
    pub fn add_claim(&self, mut claim: IPAddressClaim) {
        claim.metadata.resource_version = Some(self.next_resource_version());
        let k = key(&claim.namespace().unwrap_or_default(), &claim.name_any());
        self.claims.lock().unwrap().insert(k, claim);
    }

    /// Current stored claim, if any
    pub fn claim(&self, namespace: &str, name: &str) -> Option<IPAddressClaim> {
        self.claims.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Current stored cluster, if any
    pub fn cluster(&self, namespace: &str, name: &str) -> Option<Cluster> {
        self.clusters.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Act as the IPAM provider: create an IPAddress named after the claim and
    /// point the claim status at it.
    pub fn bind_claim(&self, namespace: &str, claim_name: &str, address: &str) {
        bind(self, namespace, claim_name, address);
    }

    /// Bind the claim after it has been read `reads` more times; the read
    /// after that sees it bound.
    pub fn bind_after_reads(&self, namespace: &str, claim_name: &str, address: &str, reads: u32) {
        self.deferred_binds
            .lock()
            .unwrap()
            .insert(key(namespace, claim_name), (address.to_string(), reads));
    }

    /// Point a claim at an address record without creating the record.
    pub fn set_claim_address_ref(&self, namespace: &str, claim_name: &str, address_name: &str) {
        if let Some(claim) = self.claims.lock().unwrap().get_mut(&key(namespace, claim_name)) {
            claim.status = Some(IPAddressClaimStatus {
                address_ref: Some(LocalObjectReference { name: address_name.to_string() }),
                conditions: vec![],
            });
        }
    }

    /// Add an IPAddress record directly (for test setup)
    pub fn add_ip_address(&self, ip: IPAddress) {
        let k = key(&ip.namespace().unwrap_or_default(), &ip.name_any());
        self.ip_addresses.lock().unwrap().insert(k, ip);
    }

    /// The next `create_claim` stores `winner` first, as if another writer got
    /// there between our read and our create, and reports already-exists.
    pub fn inject_create_race(&self, winner: IPAddressClaim) {
        *self.create_race.lock().unwrap() = Some(winner);
    }

    /// Make `list_global_pools` fail until cleared with `None`.
    pub fn set_list_pools_error(&self, message: Option<&str>) {
        *self.list_pools_error.lock().unwrap() = message.map(str::to_string);
    }

    /// Fail the next `count` claim reads with a server error.
    pub fn fail_claim_reads(&self, count: u32) {
        *self.claim_read_failures.lock().unwrap() = count;
    }

    /// Fail the next `count` claim replaces with a conflict.
    pub fn conflict_claim_replaces(&self, count: u32) {
        *self.replace_conflicts.lock().unwrap() = count;
    }

    pub fn create_claim_calls(&self) -> u32 {
        *self.create_claim_calls.lock().unwrap()
    }

    pub fn replace_claim_calls(&self) -> u32 {
        *self.replace_claim_calls.lock().unwrap()
    }

    /// Merge patches received by `patch_cluster`, in order
    pub fn cluster_patches(&self) -> Vec<serde_json::Value> {
        self.cluster_patches.lock().unwrap().clone()
    }

    pub fn claim_count(&self) -> usize {
        self.claims.lock().unwrap().len()
    }
}

fn bind(client: &MockCapiClient, namespace: &str, claim_name: &str, address: &str) {
    let mut ip = IPAddress::new(
        claim_name,
        IPAddressSpec {
            claim_ref: LocalObjectReference { name: claim_name.to_string() },
            address: address.to_string(),
            ..Default::default()
        },
    );
    ip.metadata.namespace = Some(namespace.to_string());
    client.add_ip_address(ip);
    client.set_claim_address_ref(namespace, claim_name, claim_name);
}

#[async_trait::async_trait]
impl CapiClientTrait for MockCapiClient {
    async fn patch_cluster(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<Cluster, CapiError> {
        let current = self
            .cluster(namespace, name)
            .ok_or_else(|| CapiError::NotFound(format!("Cluster {}/{}", namespace, name)))?;
        let mut doc = serde_json::to_value(&current)?;
        apply_merge_patch(&mut doc, patch);
        let mut updated: Cluster = serde_json::from_value(doc)?;
        updated.metadata.resource_version = Some(self.next_resource_version());

        self.cluster_patches.lock().unwrap().push(patch.clone());
        self.clusters
            .lock()
            .unwrap()
            .insert(key(namespace, name), updated.clone());
        Ok(updated)
    }

    async fn get_cluster_class(&self, name: &str, namespace: Option<&str>) -> Result<ClusterClass, CapiError> {
        let ns = namespace.unwrap_or("");
        self.cluster_classes
            .lock()
            .unwrap()
            .get(&key(ns, name))
            .cloned()
            .ok_or_else(|| CapiError::NotFound(format!("ClusterClass {}/{}", ns, name)))
    }

    async fn list_global_pools(&self) -> Result<Vec<GlobalInClusterIPPool>, CapiError> {
        if let Some(message) = self.list_pools_error.lock().unwrap().clone() {
            return Err(CapiError::Api { code: 500, message });
        }
        Ok(self.pools.lock().unwrap().values().cloned().collect())
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<IPAddressClaim, CapiError> {
        {
            let mut failures = self.claim_read_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(CapiError::Api {
                    code: 500,
                    message: "injected read failure".to_string(),
                });
            }
        }

        let due = {
            let mut deferred = self.deferred_binds.lock().unwrap();
            let k = key(namespace, name);
            match deferred.get_mut(&k) {
                Some((_, remaining)) if *remaining > 0 => {
                    *remaining -= 1;
                    None
                }
                Some(_) => deferred.remove(&k).map(|(address, _)| address),
                None => None,
            }
        };
        if let Some(address) = due {
            if self.claim(namespace, name).is_some() {
                bind(self, namespace, name, &address);
            }
        }

        self.claim(namespace, name)
            .ok_or_else(|| CapiError::NotFound(format!("IPAddressClaim {}/{}", namespace, name)))
    }

    async fn create_claim(&self, claim: &IPAddressClaim) -> Result<IPAddressClaim, CapiError> {
        *self.create_claim_calls.lock().unwrap() += 1;
        let namespace = claim.namespace().unwrap_or_default();
        let name = claim.name_any();
        let what = format!("IPAddressClaim {}/{}", namespace, name);

        if let Some(winner) = self.create_race.lock().unwrap().take() {
            self.add_claim(winner);
            return Err(CapiError::AlreadyExists(what));
        }
        if self.claim(&namespace, &name).is_some() {
            return Err(CapiError::AlreadyExists(what));
        }

        let mut created = claim.clone();
        created.metadata.resource_version = Some(self.next_resource_version());
        created.metadata.uid = Some(format!("claim-uid-{}", name));
        self.claims
            .lock()
            .unwrap()
            .insert(key(&namespace, &name), created.clone());
        Ok(created)
    }

    async fn replace_claim(&self, claim: &IPAddressClaim) -> Result<IPAddressClaim, CapiError> {
        *self.replace_claim_calls.lock().unwrap() += 1;
        let namespace = claim.namespace().unwrap_or_default();
        let name = claim.name_any();
        let what = format!("IPAddressClaim {}/{}", namespace, name);

        {
            let mut conflicts = self.replace_conflicts.lock().unwrap();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(CapiError::Conflict(what));
            }
        }

        let mut claims = self.claims.lock().unwrap();
        let stored = claims
            .get(&key(&namespace, &name))
            .ok_or_else(|| CapiError::NotFound(what.clone()))?;
        if stored.metadata.resource_version != claim.metadata.resource_version {
            return Err(CapiError::Conflict(what));
        }

        // Status lives in a subresource and is not written by replace
        let mut replaced = claim.clone();
        replaced.status = stored.status.clone();
        replaced.metadata.resource_version = Some(self.next_resource_version());
        claims.insert(key(&namespace, &name), replaced.clone());
        Ok(replaced)
    }

    async fn get_ip_address(&self, namespace: &str, name: &str) -> Result<IPAddress, CapiError> {
        self.ip_addresses
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| CapiError::NotFound(format!("IPAddress {}/{}", namespace, name)))
    }
}
