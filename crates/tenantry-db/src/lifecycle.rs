//! Tenant creation, update and deletion.
//!
//! A tenant is a registry row plus a database; the two are kept in
//! lockstep. Creation is two-phase: the row is inserted as
//! `Provisioning`, the database is defined and populated, then the row is
//! flipped to `Ready`. If provisioning fails the database (when this call
//! created it) and the row are removed again. A database left behind by a
//! failed drop is reclaimed by the next create that names it. All
//! lifecycle operations run one at a time.

use surrealdb::Connection;
use tenantry_core::error::{TenantryError, TenantryResult};
use tenantry_core::models::tenant::{CreateTenant, Tenant, UpdateTenant};
use tenantry_core::repository::{PaginatedResult, Pagination};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::DbError;
use crate::pool::SchemaLease;
use crate::repository::SurrealTenantRepository;
use crate::router::{SchemaRouter, SchemaTarget, read_marker};
use crate::schema::{define_database_sql, remove_database_sql, tenant_schema};

pub struct TenantLifecycleManager<C: Connection> {
    router: SchemaRouter<C>,
    lock: Mutex<()>,
}

/// How far provisioning got before failing.
struct ProvisionFailure {
    /// Whether the database is ours to remove.
    owns_schema: bool,
    error: DbError,
}

impl<C: Connection> TenantLifecycleManager<C> {
    pub fn new(router: SchemaRouter<C>) -> Self {
        Self {
            router,
            lock: Mutex::new(()),
        }
    }

    pub async fn create_tenant(&self, input: CreateTenant) -> TenantryResult<Tenant> {
        input.validate()?;
        let _serialized = self.lock.lock().await;

        let mut lease = self.router.acquire(SchemaTarget::Public).await?;
        let tenant = {
            let registry = SurrealTenantRepository::scoped(&lease)?;
            if registry.find_by_name(input.name.trim()).await?.is_some() {
                return Err(TenantryError::Conflict {
                    entity: "tenant".into(),
                    field: "name".into(),
                });
            }
            if registry.find_by_schema(&input.schema_name).await?.is_some() {
                return Err(TenantryError::Conflict {
                    entity: "tenant".into(),
                    field: "schema_name".into(),
                });
            }
            registry.insert_provisioning(Uuid::new_v4(), &input).await?
        };

        info!(
            tenant_id = %tenant.id,
            schema = %tenant.schema_name,
            "Provisioning tenant schema"
        );

        match provision(&mut lease, &tenant).await {
            Ok(()) => {}
            Err(failure) => {
                error!(
                    tenant_id = %tenant.id,
                    schema = %tenant.schema_name,
                    error = %failure.error,
                    "Tenant provisioning failed, compensating"
                );
                compensate(&mut lease, &tenant, failure.owns_schema).await;
                return Err(TenantryError::Infrastructure(format!(
                    "provisioning schema '{}' failed: {}",
                    tenant.schema_name, failure.error
                )));
            }
        }

        let ready = SurrealTenantRepository::scoped(&lease)?
            .mark_ready(tenant.id)
            .await;
        match ready {
            Ok(tenant) => {
                info!(tenant_id = %tenant.id, schema = %tenant.schema_name, "Tenant ready");
                Ok(tenant)
            }
            Err(e) => {
                error!(tenant_id = %tenant.id, error = %e, "Could not mark tenant ready, compensating");
                compensate(&mut lease, &tenant, true).await;
                Err(TenantryError::Infrastructure(format!(
                    "activating tenant {} failed: {e}",
                    tenant.id
                )))
            }
        }
    }

    /// Change quotas or the active flag. The schema name is immutable.
    pub async fn update_tenant(&self, id: Uuid, input: UpdateTenant) -> TenantryResult<Tenant> {
        if input.is_empty() {
            return Err(TenantryError::validation("nothing to update"));
        }
        let _serialized = self.lock.lock().await;
        let lease = self.router.acquire(SchemaTarget::Public).await?;
        let registry = SurrealTenantRepository::scoped(&lease)?;
        registry.get(id).await?;
        let tenant = registry.update(id, input).await?;
        info!(tenant_id = %id, is_active = tenant.is_active, "Tenant updated");
        Ok(tenant)
    }

    /// Remove the registry row, then drop the schema. Once the row is gone
    /// the router answers `NotFound` for this tenant, even if the drop
    /// fails. Such an orphaned database is reclaimed by the next create
    /// that uses its schema name.
    pub async fn delete_tenant(&self, id: Uuid) -> TenantryResult<Tenant> {
        let _serialized = self.lock.lock().await;
        let lease = self.router.acquire(SchemaTarget::Public).await?;
        let registry = SurrealTenantRepository::scoped(&lease)?;
        let tenant = registry.get(id).await?;

        registry.delete(id).await?;
        let drop_sql = remove_database_sql(&tenant.schema_name)?;
        lease
            .db()
            .query(&drop_sql)
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| {
                error!(
                    tenant_id = %id,
                    schema = %tenant.schema_name,
                    error = %e,
                    "Registry row removed but schema drop failed"
                );
                DbError::query(e)
            })?;

        info!(tenant_id = %id, schema = %tenant.schema_name, "Tenant deleted");
        Ok(tenant)
    }

    pub async fn get_tenant(&self, id: Uuid) -> TenantryResult<Tenant> {
        self.router
            .with_public_schema(|lease| async move {
                SurrealTenantRepository::scoped(&lease)?.get(id).await
            })
            .await
    }

    pub async fn list_tenants(
        &self,
        pagination: Pagination,
    ) -> TenantryResult<PaginatedResult<Tenant>> {
        self.router
            .with_public_schema(|lease| async move {
                SurrealTenantRepository::scoped(&lease)?
                    .list(pagination)
                    .await
            })
            .await
    }
}

/// Define the database, apply the tenant tables, claim the schema with the
/// binding marker, and leave the lease bound to `public` again.
///
/// A database whose marker names a tenant with no registry row is the
/// remnant of a failed drop. It is removed and provisioned afresh; a
/// marker naming a registered tenant is never touched.
async fn provision<C: Connection>(
    lease: &mut SchemaLease<C>,
    tenant: &Tenant,
) -> Result<(), ProvisionFailure> {
    let unowned = |error: DbError| ProvisionFailure {
        owns_schema: false,
        error,
    };
    let owned = |error: DbError| ProvisionFailure {
        owns_schema: true,
        error,
    };

    define_tenant_database(lease, tenant).await.map_err(unowned)?;

    match read_marker(lease).await.map_err(unowned)? {
        Some((owner, _)) if owner != tenant.id => {
            lease.bind_public().await.map_err(unowned)?;
            let registry = SurrealTenantRepository::scoped(lease)
                .map_err(|e| unowned(DbError::Binding(e.to_string())))?;
            match registry.get(owner).await {
                Err(TenantryError::NotFound { .. }) => {}
                Ok(_) => {
                    return Err(unowned(DbError::Binding(format!(
                        "schema '{}' already belongs to tenant {owner}",
                        tenant.schema_name
                    ))));
                }
                Err(e) => return Err(unowned(DbError::Binding(e.to_string()))),
            }

            warn!(
                tenant_id = %tenant.id,
                schema = %tenant.schema_name,
                previous_owner = %owner,
                "Reclaiming orphaned schema"
            );
            let drop_sql = remove_database_sql(&tenant.schema_name).map_err(unowned)?;
            run_ddl(lease, &drop_sql).await.map_err(unowned)?;
            define_tenant_database(lease, tenant).await.map_err(owned)?;
            write_marker(lease, tenant).await.map_err(owned)?;
        }
        Some(_) => {}
        None => write_marker(lease, tenant).await.map_err(owned)?,
    }

    lease.bind_public().await.map_err(owned)?;
    Ok(())
}

/// Define the database if missing, bind the lease to it and apply the
/// tenant tables.
async fn define_tenant_database<C: Connection>(
    lease: &mut SchemaLease<C>,
    tenant: &Tenant,
) -> Result<(), DbError> {
    let define = define_database_sql(&tenant.schema_name)?;
    run_ddl(lease, &define).await?;
    lease.bind_tenant(tenant).await?;
    run_ddl(lease, tenant_schema()).await
}

async fn run_ddl<C: Connection>(lease: &SchemaLease<C>, sql: &str) -> Result<(), DbError> {
    lease
        .db()
        .query(sql)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;
    Ok(())
}

async fn write_marker<C: Connection>(lease: &SchemaLease<C>, tenant: &Tenant) -> Result<(), DbError> {
    lease
        .db()
        .query(
            "CREATE type::record('schema_binding', 'identity') SET \
             tenant_id = $tenant_id, schema_name = $schema_name",
        )
        .bind(("tenant_id", tenant.id.to_string()))
        .bind(("schema_name", tenant.schema_name.clone()))
        .await?
        .check()
        .map_err(DbError::query)?;
    Ok(())
}

/// Best-effort rollback of a failed create. Each step is logged; none
/// escalates.
async fn compensate<C: Connection>(lease: &mut SchemaLease<C>, tenant: &Tenant, drop_schema: bool) {
    if let Err(e) = lease.bind_public().await {
        error!(tenant_id = %tenant.id, error = %e, "Compensation could not bind public schema");
        return;
    }

    if drop_schema {
        let dropped = match remove_database_sql(&tenant.schema_name) {
            Ok(sql) => lease
                .db()
                .query(&sql)
                .await
                .map_err(DbError::from)
                .and_then(|r| r.check().map(|_| ()).map_err(DbError::from)),
            Err(e) => Err(e),
        };
        if let Err(e) = dropped {
            error!(
                tenant_id = %tenant.id,
                schema = %tenant.schema_name,
                error = %e,
                "Compensation could not drop schema"
            );
        }
    } else {
        warn!(
            tenant_id = %tenant.id,
            schema = %tenant.schema_name,
            "Leaving pre-existing schema in place"
        );
    }

    let registry = match SurrealTenantRepository::scoped(lease) {
        Ok(registry) => registry,
        Err(e) => {
            error!(tenant_id = %tenant.id, error = %e, "Compensation lost its public binding");
            return;
        }
    };
    if let Err(e) = registry.delete(tenant.id).await {
        error!(tenant_id = %tenant.id, error = %e, "Compensation could not delete registry row");
    }
}
