//! Schema definitions and migration runner for SurrealDB.
//!
//! Tenancy is schema-per-tenant: one SurrealDB namespace holds a `public`
//! database (tenant registry, audit log, migration bookkeeping) plus one
//! database per tenant holding that tenant's users and resources. UUIDs
//! are stored as strings. Enums are stored as strings with ASSERT
//! constraints for validation.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tenantry_core::models::tenant::validate_schema_name;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking (public database)
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "tenant_registry_and_audit_log",
    sql: PUBLIC_SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Public database v1
// -----------------------------------------------------------------------

const PUBLIC_SCHEMA_V1: &str = "\
-- =======================================================================
-- Tenant registry
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD schema_name ON TABLE tenant TYPE string;
DEFINE FIELD max_users ON TABLE tenant TYPE option<int>;
DEFINE FIELD max_resources ON TABLE tenant TYPE option<int>;
DEFINE FIELD max_resources_per_user ON TABLE tenant TYPE option<int>;
DEFINE FIELD is_active ON TABLE tenant TYPE bool DEFAULT true;
DEFINE FIELD status ON TABLE tenant TYPE string \
    ASSERT $value IN ['Provisioning', 'Ready'];
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_tenant_name ON TABLE tenant COLUMNS name UNIQUE;
DEFINE INDEX idx_tenant_schema_name ON TABLE tenant \
    COLUMNS schema_name UNIQUE;

-- =======================================================================
-- Audit log (append-only, outlives tenant schemas)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD tenant_id ON TABLE audit_log TYPE string;
DEFINE FIELD user_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD action ON TABLE audit_log TYPE string \
    ASSERT $value IN ['CREATED_USER', 'UPDATED_USER', 'DELETED_USER', \
    'CREATED_RESOURCE', 'UPDATED_RESOURCE', 'DELETED_RESOURCE', \
    'CREATED_TENANT', 'UPDATED_TENANT', 'DELETED_TENANT', \
    'LOGIN_SUCCESS', 'LOGIN_FAILURE', 'LOGOUT'];
DEFINE FIELD entity_type ON TABLE audit_log TYPE option<string> \
    ASSERT $value IN [NONE, 'User', 'Resource', 'Tenant'];
DEFINE FIELD entity_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD details ON TABLE audit_log TYPE string;
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime;
DEFINE INDEX idx_audit_tenant_time ON TABLE audit_log \
    COLUMNS tenant_id, timestamp;
DEFINE INDEX idx_audit_tenant_user ON TABLE audit_log \
    COLUMNS tenant_id, user_id;
";

// -----------------------------------------------------------------------
// Per-tenant database
// -----------------------------------------------------------------------

/// Applied to every tenant database at provisioning. Idempotent, so
/// re-running it against an existing schema changes nothing.
const TENANT_SCHEMA: &str = "\
DEFINE TABLE IF NOT EXISTS schema_binding SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS tenant_id ON TABLE schema_binding TYPE string;
DEFINE FIELD IF NOT EXISTS schema_name ON TABLE schema_binding TYPE string;
DEFINE FIELD IF NOT EXISTS created_at ON TABLE schema_binding TYPE datetime \
    DEFAULT time::now();

DEFINE TABLE IF NOT EXISTS user SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS tenant_id ON TABLE user TYPE string;
DEFINE FIELD IF NOT EXISTS username ON TABLE user TYPE string;
DEFINE FIELD IF NOT EXISTS password_hash ON TABLE user TYPE string;
DEFINE FIELD IF NOT EXISTS role ON TABLE user TYPE string \
    ASSERT $value IN ['ADMIN', 'MANAGER', 'EMPLOYEE'];
DEFINE FIELD IF NOT EXISTS deleted ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD IF NOT EXISTS deleted_at ON TABLE user TYPE option<datetime>;
DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD IF NOT EXISTS updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_user_username ON TABLE user \
    COLUMNS username UNIQUE;

DEFINE TABLE IF NOT EXISTS resource SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS tenant_id ON TABLE resource TYPE string;
DEFINE FIELD IF NOT EXISTS name ON TABLE resource TYPE string;
DEFINE FIELD IF NOT EXISTS description ON TABLE resource \
    TYPE option<string>;
DEFINE FIELD IF NOT EXISTS owner_id ON TABLE resource TYPE string;
DEFINE FIELD IF NOT EXISTS deleted ON TABLE resource TYPE bool \
    DEFAULT false;
DEFINE FIELD IF NOT EXISTS deleted_at ON TABLE resource \
    TYPE option<datetime>;
DEFINE FIELD IF NOT EXISTS created_at ON TABLE resource TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD IF NOT EXISTS updated_at ON TABLE resource TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_resource_owner ON TABLE resource \
    COLUMNS owner_id, deleted;
DEFINE INDEX IF NOT EXISTS idx_resource_created ON TABLE resource \
    COLUMNS created_at;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations on the `public` database.
///
/// The client must already have the namespace and `public` database
/// selected. Creates a `_migration` tracking table on first run, then
/// applies each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// `DEFINE DATABASE` for a tenant schema. Identifiers cannot be bound as
/// parameters, so the name is validated before it is interpolated.
pub(crate) fn define_database_sql(schema: &str) -> Result<String, DbError> {
    validate_schema_name(schema).map_err(|e| DbError::Binding(e.to_string()))?;
    Ok(format!("DEFINE DATABASE IF NOT EXISTS {schema}"))
}

pub(crate) fn remove_database_sql(schema: &str) -> Result<String, DbError> {
    validate_schema_name(schema).map_err(|e| DbError::Binding(e.to_string()))?;
    Ok(format!("REMOVE DATABASE IF EXISTS {schema}"))
}

/// Table definitions applied inside each tenant database.
pub fn tenant_schema() -> &'static str {
    TENANT_SCHEMA
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn tenant_schema_is_idempotent() {
        for stmt in TENANT_SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| s.starts_with("DEFINE"))
        {
            assert!(stmt.contains("IF NOT EXISTS"), "{stmt}");
        }
    }

    #[test]
    fn ddl_rejects_unsafe_schema_names() {
        assert_eq!(
            define_database_sql("acme").unwrap(),
            "DEFINE DATABASE IF NOT EXISTS acme"
        );
        assert!(define_database_sql("acme; REMOVE NAMESPACE prod").is_err());
        assert!(remove_database_sql("public").is_err());
    }
}
