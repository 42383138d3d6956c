//! Tenantry Auth: token issuance and validation, principal resolution,
//! and the login/logout flow.

pub mod config;
pub mod error;
pub mod password;
pub mod resolver;
pub mod revocation;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use error::AuthError;
pub use resolver::{TenantIdentityResolver, bearer_token};
pub use revocation::RevokedTokens;
pub use service::{AuthService, LoginInput, LoginOutput};
pub use token::{AccessTokenClaims, TokenValidator, ValidatedClaims};
