//! Domain models shared across all Tenantry crates.

pub mod audit;
pub mod principal;
pub mod quota;
pub mod resource;
pub mod tenant;
pub mod user;
