//! Cluster API VIP allocator
//!
//! Assigns control-plane and ingress VIPs to Cluster API clusters from
//! label-selected GlobalInClusterIPPools. Two entry points share one
//! allocation engine:
//! - a runtime extension (GeneratePatches hook) that allocates before the
//!   Cluster is stored
//! - a background reconciler that covers everything the hook did not
//!
//! Configuration comes from environment variables, see [`config`].

mod config;
mod controller;
mod error;
mod hook;
mod leader;
mod metrics;
mod reconciler;
mod server;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // kube's rustls client needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        tracing::debug!("rustls crypto provider already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Cluster API VIP allocator");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Extension name: {}", config.extension_name);
    info!("  Reconciler enabled: {}", config.enable_reconciler);
    info!(
        "  Runtime extension enabled: {} (listening on {})",
        config.enable_runtime_extension, config.hook_bind_address
    );
    info!("  Metrics address: {}", config.metrics_bind_address);
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!(
        "  Hook polling: every {:?} for up to {:?} (hook timeout {:?})",
        config.hook_poll_interval, config.hook_poll_timeout, config.hook_timeout
    );
    info!("  Requeue delay: {:?}", config.requeue_delay);
    match &config.leader_election {
        Some(election) => info!(
            "  Leader election: Lease {}/{} as {}",
            election.namespace, election.lease_name, election.identity
        ),
        None => info!("  Leader election: disabled"),
    }

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
