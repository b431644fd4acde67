//! Cluster API runtime extension: synchronous VIP allocation during
//! topology reconciliation, served over HTTP.

pub mod extension;
pub mod server;
pub mod types;


pub use extension::VipExtension;
