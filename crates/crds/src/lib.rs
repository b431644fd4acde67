//! Cluster API resource models
//!
//! Typed views of the Cluster API and IPAM resources the VIP allocator
//! reads and writes. These model existing upstream schemas; no CRDs are
//! generated from them.

pub mod capi;
pub mod ipam;
pub mod labels;
pub mod references;

pub use capi::*;
pub use ipam::*;
pub use labels::*;
pub use references::*;
