//! CapiClient trait for mocking
//!
//! The reconciler and the runtime extension only ever see this trait. The
//! kube-backed [`CapiClient`](crate::CapiClient) implements it for real
//! clusters and [`MockCapiClient`](crate::mock::MockCapiClient) implements it
//! in memory for unit tests.

use crate::error::CapiError;
use crds::{Cluster, ClusterClass, GlobalInClusterIPPool, IPAddress, IPAddressClaim};

/// Trait for Cluster API / IPAM operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait CapiClientTrait: Send + Sync {
    // Cluster API
    /// Apply a JSON merge patch to a cluster and return the updated object.
    ///
    /// The patch carries no resourceVersion, so fields it does not mention are
    /// left as the server has them.
    async fn patch_cluster(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<Cluster, CapiError>;

    /// Fetch a ClusterClass; `None` looks it up without a namespace.
    async fn get_cluster_class(&self, name: &str, namespace: Option<&str>) -> Result<ClusterClass, CapiError>;

    // IPAM
    async fn list_global_pools(&self) -> Result<Vec<GlobalInClusterIPPool>, CapiError>;
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<IPAddressClaim, CapiError>;

    /// Create a claim; a concurrent creator surfaces as [`CapiError::AlreadyExists`].
    async fn create_claim(&self, claim: &IPAddressClaim) -> Result<IPAddressClaim, CapiError>;

    /// Replace a claim guarded by its resourceVersion; a stale version surfaces
    /// as [`CapiError::Conflict`].
    async fn replace_claim(&self, claim: &IPAddressClaim) -> Result<IPAddressClaim, CapiError>;

    async fn get_ip_address(&self, namespace: &str, name: &str) -> Result<IPAddress, CapiError>;
}
