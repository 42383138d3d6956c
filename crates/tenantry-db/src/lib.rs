//! Tenantry Database: SurrealDB persistence with one database per
//! tenant.
//!
//! This crate provides:
//! - A pool of independent sessions ([`SchemaPool`], [`SchemaLease`])
//! - Tenant-to-schema routing ([`SchemaRouter`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Repositories for the registry, users, resources and the audit log
//! - Quota admission ([`QuotaEnforcer`]) and tenant lifecycle
//!   ([`TenantLifecycleManager`])

mod connection;
mod error;
pub mod filter;
mod lifecycle;
mod pool;
mod quota;
pub mod repository;
mod router;
mod schema;

pub use connection::{DbConfig, connect_pool};
pub use error::DbError;
pub use lifecycle::TenantLifecycleManager;
pub use pool::{SchemaBinding, SchemaLease, SchemaPool};
pub use quota::{QuotaEnforcer, QuotaReservation};
pub use router::{SchemaRouter, SchemaTarget};
pub use schema::{run_migrations, tenant_schema};
