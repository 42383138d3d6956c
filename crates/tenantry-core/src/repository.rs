//! Data access seams between crates.
//!
//! The auth crate depends only on these traits; the db crate provides the
//! SurrealDB implementations.

use uuid::Uuid;

use crate::error::TenantryResult;
use crate::models::{audit::AuditLogEntry, tenant::Tenant, user::UserCredentials};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Pagination {
    pub const MAX_LIMIT: u64 = 200;

    pub fn page(page: u64, size: u64) -> Self {
        let limit = size.clamp(1, Self::MAX_LIMIT);
        Self {
            offset: page.saturating_mul(limit),
            limit,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// Read access to the tenant registry.
pub trait TenantDirectory: Send + Sync {
    /// Returns `NotFound` for unknown tenants.
    fn find_tenant(&self, id: Uuid) -> impl Future<Output = TenantryResult<Tenant>> + Send;
}

/// Lookup of login credentials inside a tenant's schema.
pub trait CredentialStore: Send + Sync {
    /// Returns `NotFound` for unknown or soft-deleted users.
    fn find_credentials(
        &self,
        tenant_id: Uuid,
        username: &str,
    ) -> impl Future<Output = TenantryResult<UserCredentials>> + Send;
}

/// Append-only destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditLogEntry) -> impl Future<Output = TenantryResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_math_clamps_size() {
        let p = Pagination::page(2, 25);
        assert_eq!(p.offset, 50);
        assert_eq!(p.limit, 25);

        let p = Pagination::page(0, 0);
        assert_eq!(p.limit, 1);

        let p = Pagination::page(1, 10_000);
        assert_eq!(p.limit, Pagination::MAX_LIMIT);
    }
}
