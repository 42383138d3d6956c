use surrealdb::Connection;
use tenantry_core::error::TenantryResult;
use tenantry_core::models::audit::{AuditLogEntry, AuditLogFilter};
use tenantry_core::models::principal::AuthenticatedPrincipal;
use tenantry_core::policy::{Action, AuthorizationGuard};
use tenantry_core::repository::{PaginatedResult, Pagination};
use tenantry_db::SchemaRouter;
use tenantry_db::repository::SurrealAuditRepository;
use uuid::Uuid;

/// Read access to one tenant's audit trail.
pub struct AuditLogService<C: Connection> {
    router: SchemaRouter<C>,
    guard: AuthorizationGuard,
}

impl<C: Connection> AuditLogService<C> {
    pub fn new(router: SchemaRouter<C>) -> Self {
        Self {
            router,
            guard: AuthorizationGuard,
        }
    }

    /// Newest first.
    pub async fn list(
        &self,
        principal: &AuthenticatedPrincipal,
        tenant_id: Uuid,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> TenantryResult<PaginatedResult<AuditLogEntry>> {
        self.guard
            .authorize(principal, Action::ReadAuditLogs, tenant_id)?;
        self.router
            .with_public_schema(|lease| async move {
                SurrealAuditRepository::scoped(&lease)?
                    .list(tenant_id, &filter, pagination)
                    .await
            })
            .await
    }
}
