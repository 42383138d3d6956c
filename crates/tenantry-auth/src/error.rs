//! Authentication error types.

use tenantry_core::error::TenantryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing bearer credential")]
    MissingCredential,

    #[error("tenant is not available")]
    TenantUnavailable,

    #[error("token has expired")]
    TokenExpired,

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for TenantryError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Crypto(msg) => TenantryError::Crypto(msg),
            other => TenantryError::AuthenticationFailed {
                reason: other.to_string(),
            },
        }
    }
}
