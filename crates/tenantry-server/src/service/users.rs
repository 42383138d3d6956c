use std::sync::Arc;

use surrealdb::Connection;
use tenantry_core::error::TenantryResult;
use tenantry_core::models::audit::{AuditAction, EntityType, NewAuditEntry};
use tenantry_core::models::principal::AuthenticatedPrincipal;
use tenantry_core::models::quota::QuotaKind;
use tenantry_core::models::user::{CreateUser, UpdateUser, User};
use tenantry_core::policy::{Action, AuthorizationGuard};
use tenantry_core::repository::{PaginatedResult, Pagination};
use tenantry_db::repository::SurrealUserRepository;
use tenantry_db::{QuotaEnforcer, SchemaRouter};
use tracing::info;
use uuid::Uuid;

use super::AuditTrail;

pub struct UserService<C: Connection> {
    router: SchemaRouter<C>,
    quota: Arc<QuotaEnforcer>,
    audit: AuditTrail<C>,
    guard: AuthorizationGuard,
    pepper: Option<String>,
}

impl<C: Connection> UserService<C> {
    pub fn new(
        router: SchemaRouter<C>,
        quota: Arc<QuotaEnforcer>,
        audit: AuditTrail<C>,
        pepper: Option<String>,
    ) -> Self {
        Self {
            router,
            quota,
            audit,
            guard: AuthorizationGuard,
            pepper,
        }
    }

    pub async fn create(
        &self,
        principal: &AuthenticatedPrincipal,
        input: CreateUser,
    ) -> TenantryResult<User> {
        self.guard
            .authorize(principal, Action::ManageUsers, input.tenant_id)?;
        self.create_unchecked(principal.user_id, input).await
    }

    /// Create without the policy check. Callers must have authorized the
    /// write themselves.
    pub(crate) async fn create_unchecked(
        &self,
        actor: Option<Uuid>,
        input: CreateUser,
    ) -> TenantryResult<User> {
        input.validate()?;
        let tenant_id = input.tenant_id;
        let quota = &self.quota;
        let pepper = self.pepper.as_deref();

        let user = self
            .router
            .with_tenant_schema(tenant_id, |lease| async move {
                let _reservation = quota.check_and_reserve(&lease, QuotaKind::User).await?;
                SurrealUserRepository::scoped(&lease)?
                    .with_pepper(pepper)
                    .create(input)
                    .await
            })
            .await?;

        info!(%tenant_id, user_id = %user.id, username = %user.username, "User created");
        self.audit.submit(
            NewAuditEntry::new(
                tenant_id,
                AuditAction::CreatedUser,
                format!("Created user {}", user.username),
            )
            .by(actor)
            .entity(EntityType::User, user.id),
        );
        Ok(user)
    }

    pub async fn get(
        &self,
        principal: &AuthenticatedPrincipal,
        tenant_id: Uuid,
        id: Uuid,
    ) -> TenantryResult<User> {
        self.guard.authorize(principal, Action::ManageUsers, tenant_id)?;
        self.router
            .with_tenant_schema(tenant_id, |lease| async move {
                SurrealUserRepository::scoped(&lease)?.get(id).await
            })
            .await
    }

    pub async fn list(
        &self,
        principal: &AuthenticatedPrincipal,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> TenantryResult<PaginatedResult<User>> {
        self.guard.authorize(principal, Action::ManageUsers, tenant_id)?;
        self.router
            .with_tenant_schema(tenant_id, |lease| async move {
                SurrealUserRepository::scoped(&lease)?.list(pagination).await
            })
            .await
    }

    pub async fn update(
        &self,
        principal: &AuthenticatedPrincipal,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateUser,
    ) -> TenantryResult<User> {
        self.guard.authorize(principal, Action::ManageUsers, tenant_id)?;
        input.validate()?;
        let changed = describe_update(&input);
        let pepper = self.pepper.as_deref();

        let user = self
            .router
            .with_tenant_schema(tenant_id, |lease| async move {
                SurrealUserRepository::scoped(&lease)?
                    .with_pepper(pepper)
                    .update(id, input)
                    .await
            })
            .await?;

        self.audit.submit(
            NewAuditEntry::new(
                tenant_id,
                AuditAction::UpdatedUser,
                format!("Updated user {} ({changed})", user.username),
            )
            .by(principal.user_id)
            .entity(EntityType::User, user.id),
        );
        Ok(user)
    }

    /// Soft delete. The username stays reserved.
    pub async fn delete(
        &self,
        principal: &AuthenticatedPrincipal,
        tenant_id: Uuid,
        id: Uuid,
    ) -> TenantryResult<()> {
        self.guard.authorize(principal, Action::ManageUsers, tenant_id)?;
        let user = self
            .router
            .with_tenant_schema(tenant_id, |lease| async move {
                SurrealUserRepository::scoped(&lease)?.soft_delete(id).await
            })
            .await?;

        info!(%tenant_id, user_id = %id, "User deleted");
        self.audit.submit(
            NewAuditEntry::new(
                tenant_id,
                AuditAction::DeletedUser,
                format!("Deleted user {}", user.username),
            )
            .by(principal.user_id)
            .entity(EntityType::User, id),
        );
        Ok(())
    }
}

fn describe_update(input: &UpdateUser) -> String {
    let mut fields = Vec::new();
    if let Some(role) = input.role {
        fields.push(format!("role={role}"));
    }
    if input.password.is_some() {
        fields.push("password".to_string());
    }
    fields.join(", ")
}
