//! EdDSA (Ed25519) access tokens.
//!
//! Tokens are self-contained: validation checks the signature, issuer and
//! expiry without touching the database. Tenant status and revocation are
//! checked afterwards by [`crate::resolver::TenantIdentityResolver`].

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tenantry_core::models::principal::AuthenticatedPrincipal;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// JWT claims embedded in every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: the username.
    pub sub: String,
    /// Tenant ID (UUID string).
    pub tenant_id: String,
    /// Role name, e.g. `ADMIN`.
    pub role: String,
    /// Stored user ID (UUID string). Absent on platform operator tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique token ID, used for revocation.
    pub jti: String,
}

/// Claims whose signature, issuer and expiry have been checked.
#[derive(Debug, Clone)]
pub struct ValidatedClaims(pub AccessTokenClaims);

/// Verifies bearer tokens. Implemented by [`AuthConfig`]; tests substitute
/// their own.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<ValidatedClaims, AuthError>;
}

impl TokenValidator for AuthConfig {
    fn validate(&self, token: &str) -> Result<ValidatedClaims, AuthError> {
        validate_access_token(token, self)
    }
}

/// Issue a signed access token for `principal`.
pub fn issue_access_token(
    principal: &AuthenticatedPrincipal,
    config: &AuthConfig,
) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let lifetime = i64::try_from(config.access_token_lifetime_secs).unwrap_or(i64::MAX);
    let claims = AccessTokenClaims {
        sub: principal.username.clone(),
        tenant_id: principal.tenant_id.to_string(),
        role: principal.role.as_str().into(),
        uid: principal.user_id.map(|id| id.to_string()),
        iss: config.jwt_issuer.clone(),
        iat: now,
        exp: now.saturating_add(lifetime),
        jti: Uuid::new_v4().to_string(),
    };
    encode_claims(&claims, config)
}

pub(crate) fn encode_claims(
    claims: &AccessTokenClaims,
    config: &AuthConfig,
) -> Result<String, AuthError> {
    let key = EncodingKey::from_ed_pem(config.jwt_private_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad private key: {e}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), claims, &key)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
}

/// Decode and verify an access token.
pub fn decode_access_token(
    token: &str,
    config: &AuthConfig,
) -> Result<AccessTokenClaims, AuthError> {
    let key = DecodingKey::from_ed_pem(config.jwt_public_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad public key: {e}")))?;

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_issuer(&[&config.jwt_issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

    jsonwebtoken::decode::<AccessTokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid(e.to_string()),
        })
}

pub fn validate_access_token(
    token: &str,
    config: &AuthConfig,
) -> Result<ValidatedClaims, AuthError> {
    decode_access_token(token, config).map(ValidatedClaims)
}
