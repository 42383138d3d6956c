//! Audit log, stored in the `public` database.
//!
//! The table permits create and select only. Entries outlive the tenant
//! schema they describe.

use chrono::{DateTime, Utc};
use surrealdb::Connection;
use surrealdb_types::SurrealValue;
use tenantry_core::error::TenantryResult;
use tenantry_core::models::audit::{AuditAction, AuditLogEntry, AuditLogFilter, EntityType};
use tenantry_core::repository::{AuditSink, PaginatedResult, Pagination};
use uuid::Uuid;

use crate::error::DbError;
use crate::pool::SchemaLease;
use crate::router::SchemaRouter;

#[derive(Debug, SurrealValue)]
struct AuditRowWithId {
    record_id: String,
    tenant_id: String,
    user_id: Option<String>,
    action: String,
    entity_type: Option<String>,
    entity_id: Option<String>,
    details: String,
    timestamp: DateTime<Utc>,
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Corrupt(format!("invalid {field} UUID: {e}")))
}

impl AuditRowWithId {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        let action = self
            .action
            .parse::<AuditAction>()
            .map_err(|e| DbError::Corrupt(e.to_string()))?;
        let entity_type = self
            .entity_type
            .as_deref()
            .map(|t| {
                EntityType::parse(t)
                    .ok_or_else(|| DbError::Corrupt(format!("unknown entity type: {t}")))
            })
            .transpose()?;
        Ok(AuditLogEntry {
            id: parse_uuid("audit", &self.record_id)?,
            user_id: self
                .user_id
                .as_deref()
                .map(|u| parse_uuid("user", u))
                .transpose()?,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            action,
            entity_type,
            entity_id: self
                .entity_id
                .as_deref()
                .map(|e| parse_uuid("entity", e))
                .transpose()?,
            details: self.details,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

pub struct SurrealAuditRepository<'a, C: Connection> {
    lease: &'a SchemaLease<C>,
}

impl<'a, C: Connection> SurrealAuditRepository<'a, C> {
    pub fn scoped(lease: &'a SchemaLease<C>) -> TenantryResult<Self> {
        lease.public_scope()?;
        Ok(Self { lease })
    }

    pub async fn append(&self, entry: &AuditLogEntry) -> TenantryResult<()> {
        self.lease
            .db()
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 tenant_id = $tenant_id, user_id = $user_id, \
                 action = $action, entity_type = $entity_type, \
                 entity_id = $entity_id, details = $details, \
                 timestamp = $timestamp",
            )
            .bind(("id", entry.id.to_string()))
            .bind(("tenant_id", entry.tenant_id.to_string()))
            .bind(("user_id", entry.user_id.map(|u| u.to_string())))
            .bind(("action", entry.action.as_str().to_string()))
            .bind((
                "entity_type",
                entry.entity_type.map(|t| t.as_str().to_string()),
            ))
            .bind(("entity_id", entry.entity_id.map(|e| e.to_string())))
            .bind(("details", entry.details.clone()))
            .bind(("timestamp", entry.timestamp))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::query)?;
        Ok(())
    }

    /// Entries for one tenant, newest first.
    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: &AuditLogFilter,
        pagination: Pagination,
    ) -> TenantryResult<PaginatedResult<AuditLogEntry>> {
        let mut clauses = vec!["tenant_id = $tenant_id"];
        if filter.user_id.is_some() {
            clauses.push("user_id = $user_id");
        }
        if filter.action.is_some() {
            clauses.push("action = $action");
        }
        if filter.from.is_some() {
            clauses.push("timestamp >= $from");
        }
        if filter.to.is_some() {
            clauses.push("timestamp <= $to");
        }
        let where_sql = clauses.join(" AND ");

        let count_query =
            format!("SELECT count() AS total FROM audit_log WHERE {where_sql} GROUP ALL");
        let list_query = format!(
            "SELECT meta::id(id) AS record_id, * FROM audit_log WHERE {where_sql} \
             ORDER BY timestamp DESC LIMIT $limit START $offset"
        );

        let mut count_builder = self
            .lease
            .db()
            .query(&count_query)
            .bind(("tenant_id", tenant_id.to_string()));
        let mut list_builder = self
            .lease
            .db()
            .query(&list_query)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(user_id) = filter.user_id {
            count_builder = count_builder.bind(("user_id", user_id.to_string()));
            list_builder = list_builder.bind(("user_id", user_id.to_string()));
        }
        if let Some(action) = filter.action {
            count_builder = count_builder.bind(("action", action.as_str().to_string()));
            list_builder = list_builder.bind(("action", action.as_str().to_string()));
        }
        if let Some(from) = filter.from {
            count_builder = count_builder.bind(("from", from));
            list_builder = list_builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            count_builder = count_builder.bind(("to", to));
            list_builder = list_builder.bind(("to", to));
        }

        let mut count_result = count_builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = list_builder.await.map_err(DbError::from)?;
        let rows: Vec<AuditRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(AuditRowWithId::try_into_entry)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

/// [`AuditSink`] that writes through its own public-bound lease.
pub struct SurrealAuditSink<C: Connection> {
    router: SchemaRouter<C>,
}

impl<C: Connection> Clone for SurrealAuditSink<C> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
        }
    }
}

impl<C: Connection> SurrealAuditSink<C> {
    pub fn new(router: SchemaRouter<C>) -> Self {
        Self { router }
    }
}

impl<C: Connection> AuditSink for SurrealAuditSink<C> {
    async fn append(&self, entry: &AuditLogEntry) -> TenantryResult<()> {
        self.router
            .with_public_schema(|lease| async move {
                SurrealAuditRepository::scoped(&lease)?.append(entry).await
            })
            .await
    }
}
