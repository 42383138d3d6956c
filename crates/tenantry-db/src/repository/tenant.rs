//! Tenant registry, stored in the `public` database.

use chrono::{DateTime, Utc};
use surrealdb::Connection;
use surrealdb_types::SurrealValue;
use tenantry_core::error::TenantryResult;
use tenantry_core::models::tenant::{CreateTenant, Tenant, TenantStatus, UpdateTenant};
use tenantry_core::repository::{PaginatedResult, Pagination, TenantDirectory};
use uuid::Uuid;

use crate::error::DbError;
use crate::pool::SchemaLease;
use crate::router::SchemaRouter;

#[derive(Debug, SurrealValue)]
struct TenantRowWithId {
    record_id: String,
    name: String,
    schema_name: String,
    max_users: Option<u32>,
    max_resources: Option<u32>,
    max_resources_per_user: Option<u32>,
    is_active: bool,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantRowWithId {
    fn try_into_tenant(self) -> Result<Tenant, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Corrupt(format!("invalid tenant UUID: {e}")))?;
        let status = TenantStatus::parse(&self.status)
            .ok_or_else(|| DbError::Corrupt(format!("unknown tenant status: {}", self.status)))?;
        Ok(Tenant {
            id,
            name: self.name,
            schema_name: self.schema_name,
            max_users: self.max_users,
            max_resources: self.max_resources,
            max_resources_per_user: self.max_resources_per_user,
            is_active: self.is_active,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

const SELECT_TENANT: &str = "SELECT meta::id(id) AS record_id, * FROM tenant";

/// Registry queries on a lease bound to the `public` database.
pub struct SurrealTenantRepository<'a, C: Connection> {
    lease: &'a SchemaLease<C>,
}

impl<'a, C: Connection> SurrealTenantRepository<'a, C> {
    pub fn scoped(lease: &'a SchemaLease<C>) -> TenantryResult<Self> {
        lease.public_scope()?;
        Ok(Self { lease })
    }

    async fn select_one(
        &self,
        clause: &str,
        key: &'static str,
        value: String,
    ) -> Result<Option<Tenant>, DbError> {
        let query = format!("{SELECT_TENANT} WHERE {clause} LIMIT 1");
        let mut result = self
            .lease
            .db()
            .query(&query)
            .bind((key, value))
            .await?;
        let rows: Vec<TenantRowWithId> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(TenantRowWithId::try_into_tenant)
            .transpose()
    }

    pub async fn get(&self, id: Uuid) -> TenantryResult<Tenant> {
        let mut result = self
            .lease
            .db()
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('tenant', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("tenant", id))?;
        Ok(row.try_into_tenant()?)
    }

    pub async fn find_by_name(&self, name: &str) -> TenantryResult<Option<Tenant>> {
        Ok(self.select_one("name = $name", "name", name.to_string()).await?)
    }

    pub async fn find_by_schema(&self, schema_name: &str) -> TenantryResult<Option<Tenant>> {
        Ok(self
            .select_one(
                "schema_name = $schema_name",
                "schema_name",
                schema_name.to_string(),
            )
            .await?)
    }

    /// Insert a registry row in the `Provisioning` state.
    pub(crate) async fn insert_provisioning(
        &self,
        id: Uuid,
        input: &CreateTenant,
    ) -> TenantryResult<Tenant> {
        let result = self
            .lease
            .db()
            .query(
                "CREATE type::record('tenant', $id) SET \
                 name = $name, schema_name = $schema_name, \
                 max_users = $max_users, max_resources = $max_resources, \
                 max_resources_per_user = $max_resources_per_user, \
                 is_active = true, status = 'Provisioning'",
            )
            .bind(("id", id.to_string()))
            .bind(("name", input.name.trim().to_string()))
            .bind(("schema_name", input.schema_name.clone()))
            .bind(("max_users", input.max_users))
            .bind(("max_resources", input.max_resources))
            .bind(("max_resources_per_user", input.max_resources_per_user))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| DbError::Conflict {
            entity: "tenant".into(),
            field: format!("name or schema ({e})"),
        })?;
        self.get(id).await
    }

    pub(crate) async fn mark_ready(&self, id: Uuid) -> TenantryResult<Tenant> {
        self.lease
            .db()
            .query(
                "UPDATE type::record('tenant', $id) SET \
                 status = 'Ready', updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::query)?;
        self.get(id).await
    }

    pub(crate) async fn update(&self, id: Uuid, input: UpdateTenant) -> TenantryResult<Tenant> {
        let mut sets = Vec::new();
        if input.max_users.is_some() {
            sets.push("max_users = $max_users");
        }
        if input.max_resources.is_some() {
            sets.push("max_resources = $max_resources");
        }
        if input.max_resources_per_user.is_some() {
            sets.push("max_resources_per_user = $max_resources_per_user");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('tenant', $id) SET {} \
             WHERE status = 'Ready'",
            sets.join(", ")
        );

        let mut builder = self.lease.db().query(&query).bind(("id", id.to_string()));
        if let Some(max_users) = input.max_users {
            builder = builder.bind(("max_users", max_users));
        }
        if let Some(max_resources) = input.max_resources {
            builder = builder.bind(("max_resources", max_resources));
        }
        if let Some(per_user) = input.max_resources_per_user {
            builder = builder.bind(("max_resources_per_user", per_user));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::query)?;
        self.get(id).await
    }

    /// Physically remove the registry row.
    pub(crate) async fn delete(&self, id: Uuid) -> TenantryResult<()> {
        self.lease
            .db()
            .query("DELETE type::record('tenant', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::query)?;
        Ok(())
    }

    pub async fn list(&self, pagination: Pagination) -> TenantryResult<PaginatedResult<Tenant>> {
        let mut count_result = self
            .lease
            .db()
            .query("SELECT count() AS total FROM tenant GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let query = format!("{SELECT_TENANT} ORDER BY name ASC LIMIT $limit START $offset");
        let mut result = self
            .lease
            .db()
            .query(&query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(TenantRowWithId::try_into_tenant)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

/// [`TenantDirectory`] backed by the registry. Each lookup takes its own
/// public-bound lease.
pub struct SurrealTenantDirectory<C: Connection> {
    router: SchemaRouter<C>,
}

impl<C: Connection> Clone for SurrealTenantDirectory<C> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
        }
    }
}

impl<C: Connection> SurrealTenantDirectory<C> {
    pub fn new(router: SchemaRouter<C>) -> Self {
        Self { router }
    }
}

impl<C: Connection> TenantDirectory for SurrealTenantDirectory<C> {
    async fn find_tenant(&self, id: Uuid) -> TenantryResult<Tenant> {
        self.router
            .with_public_schema(|lease| async move {
                SurrealTenantRepository::scoped(&lease)?.get(id).await
            })
            .await
    }
}
