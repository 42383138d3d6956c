//! Database-specific error types and conversions.

use std::time::Duration;

use tenantry_core::error::TenantryError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate {entity}: {field} already taken")]
    Conflict { entity: String, field: String },

    #[error("No pooled connection available within {0:?}")]
    PoolTimeout(Duration),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Schema binding failed: {0}")]
    Binding(String),

    /// A stored row could not be decoded or contradicts its schema.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),
}

impl DbError {
    pub(crate) fn query(err: impl ToString) -> Self {
        Self::Query(err.to_string())
    }

    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}

impl From<DbError> for TenantryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => TenantryError::NotFound { entity, id },
            DbError::Conflict { entity, field } => TenantryError::Conflict { entity, field },
            DbError::Hash(msg) => TenantryError::Crypto(msg),
            other => TenantryError::Infrastructure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_kind() {
        let err: TenantryError = DbError::not_found("user", "42").into();
        assert!(matches!(err, TenantryError::NotFound { .. }));

        let err: TenantryError = DbError::Conflict {
            entity: "user".into(),
            field: "username".into(),
        }
        .into();
        assert!(matches!(err, TenantryError::Conflict { .. }));
    }

    #[test]
    fn pool_failures_are_infrastructure() {
        let err: TenantryError = DbError::PoolTimeout(Duration::from_secs(1)).into();
        assert!(matches!(err, TenantryError::Infrastructure(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn query_failures_are_not_reported_as_migrations() {
        let err = DbError::query("unique index violated");
        assert_eq!(err.to_string(), "Query failed: unique index violated");

        let err: TenantryError = err.into();
        match err {
            TenantryError::Infrastructure(msg) => assert!(msg.starts_with("Query failed")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
