//! Cluster API client errors

use thiserror::Error;

/// Errors that can occur when talking to the API server
#[derive(Debug, Error)]
pub enum CapiError {
    /// Resource not found (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create raced with another writer (HTTP 409 on create)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency failure (HTTP 409 on update)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// API server returned any other error status
    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    /// Transport or client-side kube error
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CapiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CapiError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, CapiError::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CapiError::Conflict(_))
    }

    /// Map a kube error for a read or patch, where 409 means a conflict.
    pub(crate) fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => CapiError::NotFound(what.to_string()),
            kube::Error::Api(ae) if ae.code == 409 => {
                CapiError::Conflict(format!("{}: {}", what, ae.message))
            }
            kube::Error::Api(ae) => CapiError::Api {
                code: ae.code,
                message: ae.message,
            },
            other => CapiError::Kube(other),
        }
    }

    /// Map a kube error for a create, where 409 means the object already exists.
    pub(crate) fn from_kube_create(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => CapiError::AlreadyExists(what.to_string()),
            other => Self::from_kube(other, what),
        }
    }
}
