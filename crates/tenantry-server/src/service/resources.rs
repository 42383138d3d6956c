use std::sync::Arc;

use surrealdb::Connection;
use tenantry_core::error::{TenantryError, TenantryResult};
use tenantry_core::models::audit::{AuditAction, EntityType, NewAuditEntry};
use tenantry_core::models::principal::AuthenticatedPrincipal;
use tenantry_core::models::quota::QuotaKind;
use tenantry_core::models::resource::{CreateResource, Resource, ResourceFilter, UpdateResource};
use tenantry_core::policy::{Action, AuthorizationGuard};
use tenantry_core::repository::{PaginatedResult, Pagination};
use tenantry_db::repository::{SurrealResourceRepository, SurrealUserRepository};
use tenantry_db::{QuotaEnforcer, SchemaRouter};
use tracing::info;
use uuid::Uuid;

use super::AuditTrail;

pub struct ResourceService<C: Connection> {
    router: SchemaRouter<C>,
    quota: Arc<QuotaEnforcer>,
    audit: AuditTrail<C>,
    guard: AuthorizationGuard,
}

impl<C: Connection> ResourceService<C> {
    pub fn new(router: SchemaRouter<C>, quota: Arc<QuotaEnforcer>, audit: AuditTrail<C>) -> Self {
        Self {
            router,
            quota,
            audit,
            guard: AuthorizationGuard,
        }
    }

    /// The owner defaults to the caller and must be a live user of the
    /// same tenant.
    pub async fn create(
        &self,
        principal: &AuthenticatedPrincipal,
        input: CreateResource,
    ) -> TenantryResult<Resource> {
        let tenant_id = input.tenant_id;
        self.guard
            .authorize(principal, Action::ManageResources, tenant_id)?;
        input.validate()?;
        let owner_id = input
            .owner_id
            .or(principal.user_id)
            .ok_or_else(|| TenantryError::validation("resource owner is required"))?;
        let quota = &self.quota;

        let resource = self
            .router
            .with_tenant_schema(tenant_id, |lease| async move {
                match SurrealUserRepository::scoped(&lease)?.get(owner_id).await {
                    Ok(_) => {}
                    Err(TenantryError::NotFound { .. }) => {
                        return Err(TenantryError::validation(
                            "resource owner is not a user of this tenant",
                        ));
                    }
                    Err(e) => return Err(e),
                }
                let _reservation = quota
                    .check_and_reserve(&lease, QuotaKind::Resource { owner_id })
                    .await?;
                SurrealResourceRepository::scoped(&lease)?
                    .create(input, owner_id)
                    .await
            })
            .await?;

        info!(%tenant_id, resource_id = %resource.id, %owner_id, "Resource created");
        self.audit.submit(
            NewAuditEntry::new(
                tenant_id,
                AuditAction::CreatedResource,
                format!("Created resource {}", resource.name),
            )
            .by(principal.user_id)
            .entity(EntityType::Resource, resource.id),
        );
        Ok(resource)
    }

    pub async fn get(
        &self,
        principal: &AuthenticatedPrincipal,
        tenant_id: Uuid,
        id: Uuid,
    ) -> TenantryResult<Resource> {
        self.guard
            .authorize(principal, Action::ReadResources, tenant_id)?;
        self.router
            .with_tenant_schema(tenant_id, |lease| async move {
                SurrealResourceRepository::scoped(&lease)?.get(id).await
            })
            .await
    }

    /// Newest first.
    pub async fn list(
        &self,
        principal: &AuthenticatedPrincipal,
        tenant_id: Uuid,
        filter: ResourceFilter,
        pagination: Pagination,
    ) -> TenantryResult<PaginatedResult<Resource>> {
        self.guard
            .authorize(principal, Action::ReadResources, tenant_id)?;
        self.router
            .with_tenant_schema(tenant_id, |lease| async move {
                SurrealResourceRepository::scoped(&lease)?
                    .list(&filter, pagination)
                    .await
            })
            .await
    }

    pub async fn update(
        &self,
        principal: &AuthenticatedPrincipal,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateResource,
    ) -> TenantryResult<Resource> {
        self.guard
            .authorize(principal, Action::ManageResources, tenant_id)?;
        input.validate()?;
        let resource = self
            .router
            .with_tenant_schema(tenant_id, |lease| async move {
                SurrealResourceRepository::scoped(&lease)?
                    .update(id, input)
                    .await
            })
            .await?;

        self.audit.submit(
            NewAuditEntry::new(
                tenant_id,
                AuditAction::UpdatedResource,
                format!("Updated resource {}", resource.name),
            )
            .by(principal.user_id)
            .entity(EntityType::Resource, id),
        );
        Ok(resource)
    }

    pub async fn delete(
        &self,
        principal: &AuthenticatedPrincipal,
        tenant_id: Uuid,
        id: Uuid,
    ) -> TenantryResult<()> {
        self.guard
            .authorize(principal, Action::ManageResources, tenant_id)?;
        let resource = self
            .router
            .with_tenant_schema(tenant_id, |lease| async move {
                SurrealResourceRepository::scoped(&lease)?
                    .soft_delete(id)
                    .await
            })
            .await?;

        info!(%tenant_id, resource_id = %id, "Resource deleted");
        self.audit.submit(
            NewAuditEntry::new(
                tenant_id,
                AuditAction::DeletedResource,
                format!("Deleted resource {}", resource.name),
            )
            .by(principal.user_id)
            .entity(EntityType::Resource, id),
        );
        Ok(())
    }
}
