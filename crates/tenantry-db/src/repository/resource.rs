//! Resources of one tenant, stored in that tenant's database.

use chrono::{DateTime, Utc};
use surrealdb::Connection;
use surrealdb_types::SurrealValue;
use tenantry_core::error::TenantryResult;
use tenantry_core::models::resource::{CreateResource, Resource, ResourceFilter, UpdateResource};
use tenantry_core::repository::{PaginatedResult, Pagination};
use uuid::Uuid;

use crate::error::DbError;
use crate::filter::RowFilter;
use crate::pool::SchemaLease;

#[derive(Debug, SurrealValue)]
struct ResourceRowWithId {
    record_id: String,
    tenant_id: String,
    name: String,
    description: Option<String>,
    owner_id: String,
    deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceRowWithId {
    fn try_into_resource(self, schema_tenant: Uuid) -> Result<Resource, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Corrupt(format!("invalid UUID: {e}")))?;
        let tenant_id = Uuid::parse_str(&self.tenant_id)
            .map_err(|e| DbError::Corrupt(format!("invalid tenant UUID: {e}")))?;
        if tenant_id != schema_tenant {
            return Err(DbError::Corrupt(format!(
                "resource {id} belongs to tenant {tenant_id}, found in schema of {schema_tenant}"
            )));
        }
        let owner_id = Uuid::parse_str(&self.owner_id)
            .map_err(|e| DbError::Corrupt(format!("invalid owner UUID: {e}")))?;
        Ok(Resource {
            id,
            tenant_id,
            name: self.name,
            description: self.description,
            owner_id,
            deleted: self.deleted,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Resource queries on a lease bound to one tenant's database.
pub struct SurrealResourceRepository<'a, C: Connection> {
    lease: &'a SchemaLease<C>,
    tenant_id: Uuid,
}

impl<'a, C: Connection> SurrealResourceRepository<'a, C> {
    pub fn scoped(lease: &'a SchemaLease<C>) -> TenantryResult<Self> {
        let tenant_id = lease.tenant_scope()?;
        Ok(Self { lease, tenant_id })
    }

    /// Insert a resource owned by `owner_id`. The caller has already
    /// checked that the owner is a live user of this tenant.
    pub async fn create(&self, input: CreateResource, owner_id: Uuid) -> TenantryResult<Resource> {
        input.validate()?;
        let id = Uuid::new_v4();

        self.lease
            .db()
            .query(
                "CREATE type::record('resource', $id) SET \
                 tenant_id = $tenant_id, name = $name, \
                 description = $description, owner_id = $owner_id, \
                 deleted = false, deleted_at = NONE",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", self.tenant_id.to_string()))
            .bind(("name", input.name.trim().to_string()))
            .bind(("description", input.description))
            .bind(("owner_id", owner_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::query)?;

        self.get(id).await
    }

    pub async fn get(&self, id: Uuid) -> TenantryResult<Resource> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM type::record('resource', $id){}",
            RowFilter::live().to_sql()
        );
        let mut result = self
            .lease
            .db()
            .query(&query)
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ResourceRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("resource", id))?;
        Ok(row.try_into_resource(self.tenant_id)?)
    }

    pub async fn update(&self, id: Uuid, input: UpdateResource) -> TenantryResult<Resource> {
        input.validate()?;
        self.get(id).await?;

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('resource', $id) SET {} \
             WHERE deleted = false",
            sets.join(", ")
        );

        let mut builder = self.lease.db().query(&query).bind(("id", id.to_string()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name.trim().to_string()));
        }
        if let Some(description) = input.description {
            // Some(None) clears the description.
            builder = builder.bind(("description", description));
        }

        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::query)?;

        self.get(id).await
    }

    /// Mark a live resource deleted. A second delete is `NotFound`, also when
    /// two deletes race: only the one whose update matched a live row wins.
    pub async fn soft_delete(&self, id: Uuid) -> TenantryResult<Resource> {
        let resource = self.get(id).await?;
        let mut result = self
            .lease
            .db()
            .query(
                "UPDATE type::record('resource', $id) SET \
                 deleted = true, deleted_at = time::now(), \
                 updated_at = time::now() \
                 WHERE deleted = false RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::query)?;
        let changed: Vec<surrealdb_types::Value> = result.take(0).map_err(DbError::from)?;
        if changed.is_empty() {
            return Err(DbError::not_found("resource", id).into());
        }
        Ok(resource)
    }

    /// Newest first, optionally filtered by name substring
    /// (case-insensitive) and owner.
    pub async fn list(
        &self,
        filter: &ResourceFilter,
        pagination: Pagination,
    ) -> TenantryResult<PaginatedResult<Resource>> {
        let needle = filter
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_lowercase);
        let where_sql = RowFilter::live()
            .and_if(
                needle.is_some(),
                "string::contains(string::lowercase(name), $needle)",
            )
            .and_if(filter.owner_id.is_some(), "owner_id = $owner_id")
            .to_sql();

        let count_query = format!("SELECT count() AS total FROM resource{where_sql} GROUP ALL");
        let list_query = format!(
            "SELECT meta::id(id) AS record_id, * FROM resource{where_sql} \
             ORDER BY created_at DESC LIMIT $limit START $offset"
        );

        let mut count_builder = self.lease.db().query(&count_query);
        let mut list_builder = self
            .lease
            .db()
            .query(&list_query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(needle) = &needle {
            count_builder = count_builder.bind(("needle", needle.clone()));
            list_builder = list_builder.bind(("needle", needle.clone()));
        }
        if let Some(owner_id) = filter.owner_id {
            count_builder = count_builder.bind(("owner_id", owner_id.to_string()));
            list_builder = list_builder.bind(("owner_id", owner_id.to_string()));
        }

        let mut count_result = count_builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = list_builder.await.map_err(DbError::from)?;
        let rows: Vec<ResourceRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_resource(self.tenant_id))
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    /// Resources counted against the tenant quota.
    pub async fn count_live(&self) -> TenantryResult<u64> {
        let query = format!(
            "SELECT count() AS total FROM resource{} GROUP ALL",
            RowFilter::live().to_sql()
        );
        let mut result = self.lease.db().query(&query).await.map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    /// Resources counted against one owner's quota.
    pub async fn count_live_by_owner(&self, owner_id: Uuid) -> TenantryResult<u64> {
        let query = format!(
            "SELECT count() AS total FROM resource{} GROUP ALL",
            RowFilter::live().and("owner_id = $owner_id").to_sql()
        );
        let mut result = self
            .lease
            .db()
            .query(&query)
            .bind(("owner_id", owner_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}
