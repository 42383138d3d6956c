//! SurrealDB repository implementations.
//!
//! Repositories borrow a [`SchemaLease`](crate::SchemaLease) and refuse to
//! run on one bound to the wrong scope: tenant data needs a tenant-bound
//! lease, the registry and the audit log need a `public`-bound one.

mod audit;
mod resource;
mod tenant;
mod user;

pub use audit::{SurrealAuditRepository, SurrealAuditSink};
pub use resource::SurrealResourceRepository;
pub use tenant::{SurrealTenantDirectory, SurrealTenantRepository};
pub use user::{SurrealCredentialStore, SurrealUserRepository, hash_password};
