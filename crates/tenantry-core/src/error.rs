//! Error taxonomy shared by every Tenantry crate.

use thiserror::Error;

use crate::models::quota::QuotaLimit;

#[derive(Debug, Error)]
pub enum TenantryError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    /// Absent, soft-deleted and foreign-tenant entities all map here so
    /// callers cannot test for existence across tenants.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Quota exceeded: {limit} (max {max})")]
    QuotaExceeded { limit: QuotaLimit, max: u64 },

    #[error("Entity already exists: {entity} with {field}")]
    Conflict { entity: String, field: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),
}

impl TenantryError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            reason: reason.into(),
        }
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Domain errors can be reported to the client without aborting
    /// unrelated state. Infrastructure and crypto failures cannot.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Infrastructure(_) | Self::Crypto(_))
    }
}

pub type TenantryResult<T> = Result<T, TenantryError>;
