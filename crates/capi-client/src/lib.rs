//! Cluster API / IPAM client
//!
//! Typed access to the handful of Cluster API and IPAM resources the VIP
//! allocator works with. The controller talks to the API server only
//! through [`CapiClientTrait`], so reconcile and hook logic can be unit
//! tested against the in-memory [`MockCapiClient`] (`test-util` feature).
//!
//! # Example
//!
//! ```no_run
//! use capi_client::{CapiClient, CapiClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CapiClient::new(kube::Client::try_default().await?);
//!
//! // Pools are cluster-scoped and listed without a label selector
//! let pools = client.list_global_pools().await?;
//!
//! // Claims are namespaced and named after their cluster
//! let claim = client.get_claim("default", "vip-cp-demo").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error classification
//!
//! API failures are mapped onto [`CapiError::NotFound`],
//! [`CapiError::AlreadyExists`] and [`CapiError::Conflict`] so callers can
//! react to races without inspecting status codes.

pub mod client;
pub mod common;
pub mod error;
#[path = "trait.rs"]
pub mod capi_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use capi_trait::CapiClientTrait;
pub use client::CapiClient;
pub use common::{apply_merge_patch, create_merge_patch, is_empty_patch};
pub use error::CapiError;
#[cfg(feature = "test-util")]
pub use mock::MockCapiClient;
