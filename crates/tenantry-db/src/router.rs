//! Tenant-to-schema routing.
//!
//! Every acquisition re-binds the session from scratch: bind `public`,
//! look the tenant up in the registry, bind the tenant database, then
//! verify the schema's binding marker. Tenant-scoped acquisitions fail
//! closed; only [`SchemaTarget::TenantOrPublic`] falls back to `public`.

use surrealdb::Connection;
use surrealdb_types::SurrealValue;
use tenantry_core::error::{TenantryError, TenantryResult};
use tenantry_core::models::tenant::{Tenant, TenantStatus};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DbError;
use crate::pool::{SchemaLease, SchemaPool};
use crate::repository::SurrealTenantRepository;

/// Which database an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaTarget {
    /// The tenant's own database. Fails closed.
    Tenant(Uuid),
    /// The shared `public` database.
    Public,
    /// The tenant's database, or `public` if it cannot be bound.
    TenantOrPublic(Uuid),
}

#[derive(Debug, SurrealValue)]
struct BindingMarkerRow {
    tenant_id: String,
    schema_name: String,
}

pub struct SchemaRouter<C: Connection> {
    pool: SchemaPool<C>,
}

impl<C: Connection> Clone for SchemaRouter<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<C: Connection> SchemaRouter<C> {
    pub fn new(pool: SchemaPool<C>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SchemaPool<C> {
        &self.pool
    }

    /// Check out a session bound to `target`.
    ///
    /// The lease must be dropped before acquiring another one on the same
    /// task, or a small pool can deadlock.
    pub async fn acquire(&self, target: SchemaTarget) -> TenantryResult<SchemaLease<C>> {
        match target {
            SchemaTarget::Public => self.acquire_public().await,
            SchemaTarget::Tenant(tenant_id) => self.acquire_tenant(tenant_id).await,
            SchemaTarget::TenantOrPublic(tenant_id) => {
                match self.acquire_tenant(tenant_id).await {
                    Ok(lease) => Ok(lease),
                    Err(e) => {
                        warn!(
                            tenant_id = %tenant_id,
                            error = %e,
                            "Tenant schema unavailable, falling back to public"
                        );
                        self.acquire_public().await
                    }
                }
            }
        }
    }

    /// Run `f` with a session bound to the tenant's schema. The session
    /// is released when `f`'s future completes or is dropped.
    pub async fn with_tenant_schema<F, Fut, T>(&self, tenant_id: Uuid, f: F) -> TenantryResult<T>
    where
        F: FnOnce(SchemaLease<C>) -> Fut,
        Fut: Future<Output = TenantryResult<T>>,
    {
        let lease = self.acquire(SchemaTarget::Tenant(tenant_id)).await?;
        f(lease).await
    }

    pub async fn with_public_schema<F, Fut, T>(&self, f: F) -> TenantryResult<T>
    where
        F: FnOnce(SchemaLease<C>) -> Fut,
        Fut: Future<Output = TenantryResult<T>>,
    {
        let lease = self.acquire(SchemaTarget::Public).await?;
        f(lease).await
    }

    pub async fn with_tenant_or_public_schema<F, Fut, T>(
        &self,
        tenant_id: Uuid,
        f: F,
    ) -> TenantryResult<T>
    where
        F: FnOnce(SchemaLease<C>) -> Fut,
        Fut: Future<Output = TenantryResult<T>>,
    {
        let lease = self.acquire(SchemaTarget::TenantOrPublic(tenant_id)).await?;
        f(lease).await
    }

    async fn acquire_public(&self) -> TenantryResult<SchemaLease<C>> {
        let mut lease = self.pool.checkout().await?;
        lease.bind_public().await?;
        Ok(lease)
    }

    async fn acquire_tenant(&self, tenant_id: Uuid) -> TenantryResult<SchemaLease<C>> {
        let mut lease = self.acquire_public().await?;
        let tenant = SurrealTenantRepository::scoped(&lease)?.get(tenant_id).await?;
        if tenant.status != TenantStatus::Ready {
            return Err(TenantryError::Infrastructure(format!(
                "tenant {tenant_id} is not provisioned"
            )));
        }

        lease.bind_tenant(&tenant).await.map_err(|e| {
            TenantryError::Infrastructure(format!(
                "cannot bind schema '{}' for tenant {tenant_id}: {e}",
                tenant.schema_name
            ))
        })?;
        verify_marker(&lease, &tenant).await?;

        debug!(
            tenant_id = %tenant_id,
            schema = %tenant.schema_name,
            connection_id = lease.connection_id(),
            "Session bound to tenant schema"
        );
        Ok(lease)
    }
}

/// Read the schema's binding marker. A dropped database may read as empty
/// rather than as an error, so callers treat `None` as missing.
pub(crate) async fn read_marker<C: Connection>(
    lease: &SchemaLease<C>,
) -> Result<Option<(Uuid, String)>, DbError> {
    let mut result = lease
        .db()
        .query("SELECT tenant_id, schema_name FROM type::record('schema_binding', 'identity')")
        .await?;
    let rows: Vec<BindingMarkerRow> = result.take(0)?;
    rows.into_iter()
        .next()
        .map(|row| {
            Uuid::parse_str(&row.tenant_id)
                .map(|id| (id, row.schema_name))
                .map_err(|e| DbError::Corrupt(format!("invalid marker tenant UUID: {e}")))
        })
        .transpose()
}

async fn verify_marker<C: Connection>(
    lease: &SchemaLease<C>,
    tenant: &Tenant,
) -> TenantryResult<()> {
    let marker = read_marker(lease).await.map_err(|e| {
        TenantryError::Infrastructure(format!(
            "schema '{}' unreadable for tenant {}: {e}",
            tenant.schema_name, tenant.id
        ))
    })?;
    match marker {
        Some((owner, schema)) if owner == tenant.id && schema == tenant.schema_name => Ok(()),
        Some((owner, _)) => {
            warn!(
                tenant_id = %tenant.id,
                schema = %tenant.schema_name,
                marker_owner = %owner,
                "Schema bound to a different tenant"
            );
            Err(TenantryError::Infrastructure(format!(
                "schema '{}' does not belong to tenant {}",
                tenant.schema_name, tenant.id
            )))
        }
        None => {
            warn!(
                tenant_id = %tenant.id,
                schema = %tenant.schema_name,
                "Schema missing or not provisioned"
            );
            Err(TenantryError::Infrastructure(format!(
                "schema '{}' for tenant {} is missing",
                tenant.schema_name, tenant.id
            )))
        }
    }
}
