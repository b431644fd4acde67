//! Cluster API core resources
//!
//! - Cluster: the target that receives a VIP
//! - ClusterClass: the template declaring accepted variables

pub mod cluster;
pub mod cluster_class;

pub use cluster::*;
pub use cluster_class::*;
