//! Kubernetes-backed Cluster API client
//!
//! Thin typed wrapper over `kube::Api` for the resources the allocator
//! touches, with API errors classified into [`CapiError`].

use crate::capi_trait::CapiClientTrait;
use crate::error::CapiError;
use crds::{Cluster, ClusterClass, GlobalInClusterIPPool, IPAddress, IPAddressClaim};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

/// Cluster API client
#[derive(Clone)]
pub struct CapiClient {
    client: Client,
}

impl CapiClient {
    /// Create a new client from an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn claims(&self, namespace: &str) -> Api<IPAddressClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl CapiClientTrait for CapiClient {
    async fn patch_cluster(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<Cluster, CapiError> {
        debug!("Merge-patching Cluster {}/{}: {}", namespace, name, patch);
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| CapiError::from_kube(e, &format!("Cluster {}/{}", namespace, name)))
    }

    async fn get_cluster_class(&self, name: &str, namespace: Option<&str>) -> Result<ClusterClass, CapiError> {
        let api: Api<ClusterClass> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        api.get(name).await.map_err(|e| {
            CapiError::from_kube(e, &format!("ClusterClass {}/{}", namespace.unwrap_or(""), name))
        })
    }

    async fn list_global_pools(&self) -> Result<Vec<GlobalInClusterIPPool>, CapiError> {
        let api: Api<GlobalInClusterIPPool> = Api::all(self.client.clone());
        let pools = api
            .list(&ListParams::default())
            .await
            .map_err(|e| CapiError::from_kube(e, "GlobalInClusterIPPool list"))?;
        debug!("Listed {} GlobalInClusterIPPools", pools.items.len());
        Ok(pools.items)
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<IPAddressClaim, CapiError> {
        self.claims(namespace)
            .get(name)
            .await
            .map_err(|e| CapiError::from_kube(e, &format!("IPAddressClaim {}/{}", namespace, name)))
    }

    async fn create_claim(&self, claim: &IPAddressClaim) -> Result<IPAddressClaim, CapiError> {
        let namespace = claim.namespace().unwrap_or_default();
        let what = format!("IPAddressClaim {}/{}", namespace, claim.name_any());
        self.claims(&namespace)
            .create(&PostParams::default(), claim)
            .await
            .map_err(|e| CapiError::from_kube_create(e, &what))
    }

    async fn replace_claim(&self, claim: &IPAddressClaim) -> Result<IPAddressClaim, CapiError> {
        let namespace = claim.namespace().unwrap_or_default();
        let name = claim.name_any();
        self.claims(&namespace)
            .replace(&name, &PostParams::default(), claim)
            .await
            .map_err(|e| CapiError::from_kube(e, &format!("IPAddressClaim {}/{}", namespace, name)))
    }

    async fn get_ip_address(&self, namespace: &str, name: &str) -> Result<IPAddress, CapiError> {
        let api: Api<IPAddress> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| CapiError::from_kube(e, &format!("IPAddress {}/{}", namespace, name)))
    }
}
