//! Wiring of the pool, router, services and auth into one handle.

use std::sync::Arc;

use surrealdb::Connection;
use surrealdb::engine::remote::ws::Client;
use tenantry_auth::{
    AuthConfig, AuthService, RevokedTokens, TenantIdentityResolver, bearer_token,
};
use tenantry_core::audit::{AuditQueue, AuditRecorder};
use tenantry_core::error::TenantryResult;
use tenantry_core::models::principal::AuthenticatedPrincipal;
use tenantry_db::repository::{SurrealAuditSink, SurrealCredentialStore, SurrealTenantDirectory};
use tenantry_db::{
    DbError, QuotaEnforcer, SchemaPool, SchemaRouter, TenantLifecycleManager, connect_pool,
};
use tracing::error;

use crate::config::ServerConfig;
use crate::service::{AuditLogService, AuditTrail, ResourceService, TenantService, UserService};

pub type SurrealAuthService<C> =
    AuthService<SurrealTenantDirectory<C>, SurrealCredentialStore<C>, SurrealAuditSink<C>>;
pub type SurrealIdentityResolver<C> = TenantIdentityResolver<SurrealTenantDirectory<C>, AuthConfig>;

pub struct Tenantry<C: Connection> {
    router: SchemaRouter<C>,
    audit: AuditTrail<C>,
    users: UserService<C>,
    resources: ResourceService<C>,
    tenants: TenantService<C>,
    audit_logs: AuditLogService<C>,
    auth: SurrealAuthService<C>,
    resolver: SurrealIdentityResolver<C>,
}

impl Tenantry<Client> {
    /// Connect to SurrealDB over WebSocket and build the service graph.
    pub async fn connect(config: &ServerConfig) -> Result<Self, DbError> {
        let pool = connect_pool(&config.db).await?;
        Ok(Self::new(pool, config))
    }
}

impl<C: Connection> Tenantry<C> {
    /// `pool`'s `public` database must already be migrated. Spawns the
    /// audit writer, so this must run inside a Tokio runtime.
    pub fn new(pool: SchemaPool<C>, config: &ServerConfig) -> Self {
        let router = SchemaRouter::new(pool);
        let quota = Arc::new(QuotaEnforcer::new(config.quota));
        let audit = AuditQueue::spawn(Arc::new(AuditRecorder::new(
            SurrealAuditSink::new(router.clone()),
            config.audit.clone(),
        )));
        let lifecycle = Arc::new(TenantLifecycleManager::new(router.clone()));
        let revoked = Arc::new(RevokedTokens::new());

        Self {
            users: UserService::new(
                router.clone(),
                Arc::clone(&quota),
                audit.clone(),
                config.auth.pepper.clone(),
            ),
            resources: ResourceService::new(router.clone(), Arc::clone(&quota), audit.clone()),
            tenants: TenantService::new(lifecycle, quota, audit.clone()),
            audit_logs: AuditLogService::new(router.clone()),
            auth: AuthService::new(
                SurrealTenantDirectory::new(router.clone()),
                SurrealCredentialStore::new(router.clone()),
                audit.clone(),
                Arc::clone(&revoked),
                config.auth.clone(),
            ),
            resolver: TenantIdentityResolver::new(
                SurrealTenantDirectory::new(router.clone()),
                config.auth.clone(),
                revoked,
            ),
            router,
            audit,
        }
    }

    /// Resolve an `Authorization` header value to a principal.
    pub async fn authenticate(&self, authorization: &str) -> TenantryResult<AuthenticatedPrincipal> {
        let token = bearer_token(authorization)?;
        self.resolver.resolve_principal(token).await
    }

    pub fn router(&self) -> &SchemaRouter<C> {
        &self.router
    }

    pub fn audit(&self) -> &AuditTrail<C> {
        &self.audit
    }

    pub fn users(&self) -> &UserService<C> {
        &self.users
    }

    pub fn resources(&self) -> &ResourceService<C> {
        &self.resources
    }

    pub fn tenants(&self) -> &TenantService<C> {
        &self.tenants
    }

    pub fn audit_logs(&self) -> &AuditLogService<C> {
        &self.audit_logs
    }

    pub fn auth(&self) -> &SurrealAuthService<C> {
        &self.auth
    }

    pub fn resolver(&self) -> &SurrealIdentityResolver<C> {
        &self.resolver
    }

    /// Drain the audit queue, retry dead letters once, then stop handing
    /// out sessions. In-flight leases finish normally. Returns how many
    /// audit entries are still undelivered.
    pub async fn shutdown(&self) -> usize {
        self.audit.flush().await;
        let recorder = self.audit.recorder();
        let written = recorder.replay_dead_letters().await;
        let pending = recorder.dead_letter_count();
        if pending > 0 {
            error!(written, pending, "Audit entries lost at shutdown");
        }
        self.router.pool().close();
        pending
    }
}
