//! Writing the VIP back to the Cluster
//!
//! Clusters are never replaced. The mutated cluster is diffed against the
//! snapshot it was built from and only that merge patch is sent, so edits
//! made by other controllers in the meantime survive.

use super::Reconciler;
use super::claim::cluster_namespace;
use crate::error::ControllerError;
use capi_client::{create_merge_patch, is_empty_patch, CapiError};
use crds::Cluster;
use kube::ResourceExt;
use tracing::{debug, info};

/// Whether `value` is usable as a Kubernetes label value.
pub fn is_valid_label_value(value: &str) -> bool {
    if value.len() > 63 {
        return false;
    }
    if value.is_empty() {
        return true;
    }
    let bytes = value.as_bytes();
    let alnum = |b: &u8| b.is_ascii_alphanumeric();
    alnum(&bytes[0])
        && alnum(&bytes[bytes.len() - 1])
        && bytes.iter().all(|b| alnum(b) || matches!(b, b'-' | b'_' | b'.'))
}

impl Reconciler {
    /// Whether the cluster's ClusterClass declares the VIP variable.
    ///
    /// The class is looked up without a namespace first, then in the
    /// cluster's namespace. A class that cannot be found is an error.
    pub async fn class_declares_variable(&self, class: &str, namespace: &str) -> Result<bool, ControllerError> {
        let cluster_class = match self.client.get_cluster_class(class, None).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => self
                .client
                .get_cluster_class(class, Some(namespace))
                .await
                .map_err(|e| ControllerError::backend(format!("reading ClusterClass {}/{}", namespace, class), e))?,
            Err(e) => return Err(ControllerError::backend(format!("reading ClusterClass {}", class), e)),
        };
        Ok(cluster_class.declares_variable(&self.config.vip_variable_name))
    }

    /// Write the control-plane VIP to `spec.controlPlaneEndpoint`.
    ///
    /// The port is only filled in when unset. When the ClusterClass declares
    /// the VIP variable, the topology variable is upserted with the same
    /// value; otherwise only the endpoint changes.
    pub async fn patch_control_plane_endpoint(
        &self,
        cluster: &Cluster,
        address: &str,
    ) -> Result<Cluster, ControllerError> {
        let namespace = cluster_namespace(cluster)?;
        let mut updated = cluster.clone();
        updated.spec.control_plane_endpoint.host = address.to_string();
        if updated.spec.control_plane_endpoint.port == 0 {
            updated.spec.control_plane_endpoint.port = self.config.default_port;
        }

        if let Some(class) = cluster.class_name() {
            if self.class_declares_variable(class, &namespace).await? {
                updated.upsert_variable(
                    &self.config.vip_variable_name,
                    serde_json::Value::String(address.to_string()),
                );
                debug!(
                    "ClusterClass {} declares {}, injecting it for cluster {}/{}",
                    class,
                    self.config.vip_variable_name,
                    namespace,
                    cluster.name_any()
                );
            }
        }

        let patched = self.apply_cluster_patch(cluster, &updated).await?;
        info!(
            "Set controlPlaneEndpoint of Cluster {}/{} to {}:{}",
            namespace,
            cluster.name_any(),
            patched.spec.control_plane_endpoint.host,
            patched.spec.control_plane_endpoint.port
        );
        Ok(patched)
    }

    /// Record the ingress VIP as a cluster annotation and label.
    ///
    /// The label is skipped when the value is not a valid label value.
    pub async fn patch_ingress_vip(&self, cluster: &Cluster, address: &str) -> Result<Cluster, ControllerError> {
        let key = &self.config.ingress_vip_annotation;
        let mut updated = cluster.clone();
        updated
            .annotations_mut()
            .insert(key.clone(), address.to_string());
        if is_valid_label_value(address) {
            updated.labels_mut().insert(key.clone(), address.to_string());
        }

        let patched = self.apply_cluster_patch(cluster, &updated).await?;
        info!(
            "Set ingress VIP of Cluster {}/{} to {}",
            cluster.namespace().unwrap_or_default(),
            cluster.name_any(),
            address
        );
        Ok(patched)
    }

    /// Send the difference between `before` and `after` as a merge patch.
    async fn apply_cluster_patch(&self, before: &Cluster, after: &Cluster) -> Result<Cluster, ControllerError> {
        let namespace = cluster_namespace(before)?;
        let name = before.name_any();
        let before_doc = serde_json::to_value(before).map_err(CapiError::from)?;
        let after_doc = serde_json::to_value(after).map_err(CapiError::from)?;
        let patch = create_merge_patch(&before_doc, &after_doc);
        if is_empty_patch(&patch) {
            debug!("Cluster {}/{} already up to date", namespace, name);
            return Ok(after.clone());
        }

        self.client
            .patch_cluster(&namespace, &name, &patch)
            .await
            .map_err(|e| ControllerError::backend(format!("patching Cluster {}/{}", namespace, name), e))
    }
}
