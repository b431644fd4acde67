//! Controller-specific error types.
//!
//! Pending allocations are not errors; they are reported as values by the
//! reconciler. Everything here is either retryable (requeue after the
//! configured delay) or a configuration problem that waits for the next
//! change to the cluster or its pools.

use capi_client::CapiError;
use kube::Error as KubeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the VIP allocator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cluster API client error without further context
    #[error("Cluster API error: {0}")]
    Capi(#[from] CapiError),

    /// Backend call failed while working on a specific object
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: CapiError,
    },

    /// No GlobalInClusterIPPool is labelled for this class and role
    #[error("no GlobalInClusterIPPool labelled for cluster class {class:?} with role {role:?}")]
    NoMatchingPool { class: String, role: String },

    /// The IPAM provider did not bind an address before the hook deadline
    #[error("timed out after {timeout:?} waiting for IPAddressClaim {claim} to be bound")]
    AllocationTimeout { claim: String, timeout: Duration },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object is missing fields the allocator needs
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Runtime extension request could not be served
    #[error("Runtime hook error: {0}")]
    Hook(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Attach object context to a client error.
    pub fn backend(context: impl Into<String>, source: CapiError) -> Self {
        ControllerError::Backend {
            context: context.into(),
            source,
        }
    }

    /// Whether retrying without an external change can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ControllerError::NoMatchingPool { .. }
                | ControllerError::InvalidConfig(_)
                | ControllerError::InvalidResource(_)
        )
    }

    /// Short label used for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            ControllerError::NoMatchingPool { .. } => "no_pool",
            ControllerError::AllocationTimeout { .. } => "timeout",
            ControllerError::Backend { source, .. } | ControllerError::Capi(source) if source.is_conflict() => "conflict",
            ControllerError::InvalidConfig(_) | ControllerError::InvalidResource(_) => "invalid",
            _ => "backend",
        }
    }
}
