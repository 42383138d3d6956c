use std::sync::Arc;

use surrealdb::Connection;
use tenantry_core::error::{TenantryError, TenantryResult};
use tenantry_core::models::audit::{AuditAction, EntityType, NewAuditEntry};
use tenantry_core::models::principal::AuthenticatedPrincipal;
use tenantry_core::models::tenant::{CreateTenant, Tenant, UpdateTenant};
use tenantry_core::models::user::{CreateUser, Role, User};
use tenantry_core::policy::{Action, AuthorizationGuard};
use tenantry_core::repository::{PaginatedResult, Pagination};
use tenantry_db::{QuotaEnforcer, TenantLifecycleManager};
use tracing::{info, warn};
use uuid::Uuid;

use super::{AuditTrail, UserService};

/// First administrator of a freshly created tenant.
#[derive(Debug, Clone)]
pub struct InitialAdmin {
    pub username: String,
    pub password: String,
}

pub struct TenantService<C: Connection> {
    lifecycle: Arc<TenantLifecycleManager<C>>,
    quota: Arc<QuotaEnforcer>,
    audit: AuditTrail<C>,
    guard: AuthorizationGuard,
}

impl<C: Connection> TenantService<C> {
    pub fn new(
        lifecycle: Arc<TenantLifecycleManager<C>>,
        quota: Arc<QuotaEnforcer>,
        audit: AuditTrail<C>,
    ) -> Self {
        Self {
            lifecycle,
            quota,
            audit,
            guard: AuthorizationGuard,
        }
    }

    pub async fn create(
        &self,
        principal: &AuthenticatedPrincipal,
        input: CreateTenant,
    ) -> TenantryResult<Tenant> {
        self.guard.authorize_role(principal, Action::ManageTenants)?;
        let tenant = self.lifecycle.create_tenant(input).await?;
        self.audit.submit(
            NewAuditEntry::new(
                tenant.id,
                AuditAction::CreatedTenant,
                format!("Created tenant {} ({})", tenant.name, tenant.schema_name),
            )
            .by(principal.user_id)
            .entity(EntityType::Tenant, tenant.id),
        );
        Ok(tenant)
    }

    /// Create a tenant and its first `ADMIN` user.
    ///
    /// If the user cannot be created the tenant is left in place without
    /// one and the error is returned.
    pub async fn create_with_admin(
        &self,
        principal: &AuthenticatedPrincipal,
        input: CreateTenant,
        admin: InitialAdmin,
        users: &UserService<C>,
    ) -> TenantryResult<(Tenant, User)> {
        let tenant = self.create(principal, input).await?;
        let user = users
            .create_unchecked(
                principal.user_id,
                CreateUser {
                    tenant_id: tenant.id,
                    username: admin.username,
                    password: admin.password,
                    role: Role::Admin,
                },
            )
            .await
            .inspect_err(|e| {
                warn!(tenant_id = %tenant.id, error = %e, "Tenant created without its initial admin");
            })?;
        Ok((tenant, user))
    }

    pub async fn get(&self, principal: &AuthenticatedPrincipal, id: Uuid) -> TenantryResult<Tenant> {
        self.guard.authorize(principal, Action::ManageTenants, id)?;
        self.lifecycle.get_tenant(id).await
    }

    /// Every tenant in the registry. Platform operators only.
    pub async fn list(
        &self,
        principal: &AuthenticatedPrincipal,
        pagination: Pagination,
    ) -> TenantryResult<PaginatedResult<Tenant>> {
        self.guard.authorize_role(principal, Action::ManageTenants)?;
        if principal.role != Role::SuperAdmin {
            return Err(TenantryError::denied("listing tenants requires SUPER_ADMIN"));
        }
        self.lifecycle.list_tenants(pagination).await
    }

    pub async fn update(
        &self,
        principal: &AuthenticatedPrincipal,
        id: Uuid,
        input: UpdateTenant,
    ) -> TenantryResult<Tenant> {
        self.guard.authorize(principal, Action::ManageTenants, id)?;
        let tenant = self.lifecycle.update_tenant(id, input).await?;
        self.audit.submit(
            NewAuditEntry::new(
                id,
                AuditAction::UpdatedTenant,
                format!("Updated tenant {} (active={})", tenant.name, tenant.is_active),
            )
            .by(principal.user_id)
            .entity(EntityType::Tenant, id),
        );
        Ok(tenant)
    }

    pub async fn delete(&self, principal: &AuthenticatedPrincipal, id: Uuid) -> TenantryResult<()> {
        self.guard.authorize(principal, Action::ManageTenants, id)?;
        let tenant = self.lifecycle.delete_tenant(id).await?;
        self.quota.forget(id);
        info!(tenant_id = %id, "Tenant removed");
        self.audit.submit(
            NewAuditEntry::new(
                id,
                AuditAction::DeletedTenant,
                format!("Deleted tenant {} ({})", tenant.name, tenant.schema_name),
            )
            .by(principal.user_id)
            .entity(EntityType::Tenant, id),
        );
        Ok(())
    }
}
