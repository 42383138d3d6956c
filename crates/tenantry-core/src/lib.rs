//! Core domain types for Tenantry: models, the error taxonomy, the
//! authorization policy, best-effort audit recording and the repository
//! seams implemented by `tenantry-db`.

pub mod audit;
pub mod error;
pub mod models;
pub mod policy;
pub mod repository;

pub use error::{TenantryError, TenantryResult};
