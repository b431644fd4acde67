//! Kubernetes resource watchers.
//!
//! Clusters are reconciled through `kube_runtime::Controller`, which handles
//! reconnection, queueing and requeue scheduling. IPAddressClaims owned by a
//! Cluster are watched as well so that a claim being bound by the IPAM
//! provider triggers the owning cluster straight away instead of waiting
//! for the next requeue.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{Cluster, IPAddressClaim, ROLE_LABEL};
use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{
    controller::{Action, Config as RuntimeConfig},
    watcher, Controller,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reconcile entry point handed to the runtime controller.
async fn reconcile(cluster: Arc<Cluster>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    debug!(
        "Reconciling Cluster {}/{}",
        cluster.namespace().unwrap_or_default(),
        cluster.name_any()
    );
    reconciler.reconcile_cluster(&cluster).await
}

/// Requeue retryable failures after the configured delay; wait for the
/// next change otherwise.
fn error_policy(cluster: Arc<Cluster>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    let name = format!("{}/{}", cluster.namespace().unwrap_or_default(), cluster.name_any());
    if error.is_retryable() {
        warn!("Reconciliation of Cluster {} failed, retrying: {}", name, error);
        Action::requeue(reconciler.config().requeue_delay)
    } else {
        error!("Reconciliation of Cluster {} failed: {}", name, error);
        Action::await_change()
    }
}

/// Watches Clusters and the claims they own.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    cluster_api: Api<Cluster>,
    claim_api: Api<IPAddressClaim>,
}

impl Watcher {
    /// Creates a new watcher, scoped to `namespace` when given.
    pub fn new(reconciler: Arc<Reconciler>, client: Client, namespace: Option<&str>) -> Self {
        let (cluster_api, claim_api) = match namespace {
            Some(ns) => (Api::namespaced(client.clone(), ns), Api::namespaced(client, ns)),
            None => (Api::all(client.clone()), Api::all(client)),
        };
        Self {
            reconciler,
            cluster_api,
            claim_api,
        }
    }

    /// Runs the Cluster controller until its stream ends.
    pub async fn watch_clusters(&self) -> Result<(), ControllerError> {
        info!("Starting Cluster watcher");

        // Debounce batches the burst of updates a new cluster goes through;
        // concurrency bounds load on the API server.
        let controller_config = RuntimeConfig::default()
            .debounce(Duration::from_secs(1))
            .concurrency(4);

        Controller::new(self.cluster_api.clone(), watcher::Config::default())
            .owns(
                self.claim_api.clone(),
                watcher::Config::default().labels(ROLE_LABEL),
            )
            .with_config(controller_config)
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled Cluster {}", obj.name),
                    Err(e) => warn!("Cluster controller error: {}", e),
                }
            })
            .await;

        info!("Cluster watcher stopped");
        Ok(())
    }
}
