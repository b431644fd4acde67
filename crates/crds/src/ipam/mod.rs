//! IPAM contract resources
//!
//! - GlobalInClusterIPPool: label-selected address pools
//! - IPAddressClaim: one address request per (cluster, role)
//! - IPAddress: the provider's confirmation carrying the bound value

pub mod global_pool;
pub mod ip_address_claim;
pub mod ip_address;

pub use global_pool::*;
pub use ip_address_claim::*;
pub use ip_address::*;
