//! Main controller implementation.
//!
//! Wires the allocation engine to its entry points and runs them until one
//! of them exits or the process receives ctrl-c:
//! - the Cluster watcher (background reconciler), behind a Lease when
//!   leader election is enabled
//! - the runtime extension HTTP server (hook)
//! - the metrics and probe HTTP server (always on)

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::hook::{self, VipExtension};
use crate::leader::LeaderElector;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::server::{self, ProbeState};
use crate::watcher::Watcher;
use capi_client::CapiClient;
use kube::Client;
use std::future::pending;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

type Task<E> = JoinHandle<Result<(), E>>;

/// Wait for an optional task; a disabled task never completes.
async fn join_optional<E>(task: &mut Option<Task<E>>) -> Result<Result<(), E>, tokio::task::JoinError> {
    match task {
        Some(handle) => handle.await,
        None => pending().await,
    }
}

/// Run the Cluster watcher, only while holding the Lease if there is one.
async fn run_reconciler(watcher: Watcher, elector: Option<LeaderElector>) -> Result<(), ControllerError> {
    let Some(elector) = elector else {
        return watcher.watch_clusters().await;
    };

    elector.acquire().await?;
    info!("Leadership acquired");
    tokio::select! {
        result = watcher.watch_clusters() => result,
        lost = elector.hold() => Err(lost),
    }
}

/// Main controller for VIP allocation.
pub struct Controller {
    cluster_watcher: Option<Task<ControllerError>>,
    hook_server: Option<Task<anyhow::Error>>,
    metrics_server: Task<anyhow::Error>,
}

impl Controller {
    /// Creates the Kubernetes client and starts every enabled entry point.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing VIP allocator");

        let kube_client = Client::try_default().await?;
        let capi_client = CapiClient::new(kube_client.clone());

        let metrics = Metrics::new()
            .map_err(|e| ControllerError::InvalidConfig(format!("failed to register metrics: {}", e)))?;
        let probes = ProbeState::new(metrics.clone());

        let reconciler = Arc::new(Reconciler::new(Box::new(capi_client), config.clone(), metrics));

        let metrics_server = {
            let probes = probes.clone();
            let addr = config.metrics_bind_address;
            tokio::spawn(async move { server::serve(addr, probes).await })
        };

        let cluster_watcher = if config.enable_reconciler {
            let elector = config
                .leader_election
                .clone()
                .map(|election| LeaderElector::new(kube_client.clone(), election));
            let watcher = Watcher::new(reconciler.clone(), kube_client, config.watch_namespace.as_deref());
            Some(tokio::spawn(run_reconciler(watcher, elector)))
        } else {
            info!("Background reconciler disabled");
            None
        };

        let hook_server = if config.enable_runtime_extension {
            let extension = Arc::new(VipExtension::new(reconciler));
            let addr = config.hook_bind_address;
            Some(tokio::spawn(async move { hook::server::serve(addr, extension).await }))
        } else {
            info!("Runtime extension disabled");
            None
        };

        probes.set_ready(true);

        Ok(Self {
            cluster_watcher,
            hook_server,
            metrics_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("VIP allocator running");

        tokio::select! {
            result = join_optional(&mut self.cluster_watcher) => {
                result.map_err(|e| ControllerError::Watch(format!("Cluster watcher panicked: {}", e)))??;
                warn!("Cluster watcher exited");
            }
            result = join_optional(&mut self.hook_server) => {
                result.map_err(|e| ControllerError::Hook(format!("runtime extension server panicked: {}", e)))?
                    .map_err(|e| ControllerError::Hook(format!("{:#}", e)))?;
                warn!("Runtime extension server exited");
            }
            result = &mut self.metrics_server => {
                result.map_err(|e| ControllerError::Watch(format!("metrics server panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("{:#}", e)))?;
                warn!("Metrics server exited");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
            }
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(self) {
        if let Some(task) = self.cluster_watcher {
            task.abort();
        }
        if let Some(task) = self.hook_server {
            task.abort();
        }
        self.metrics_server.abort();
        info!("VIP allocator stopped");
    }
}
