//! Turns a bearer token into an [`AuthenticatedPrincipal`].

use std::sync::Arc;

use tenantry_core::error::{TenantryError, TenantryResult};
use tenantry_core::models::principal::AuthenticatedPrincipal;
use tenantry_core::models::user::Role;
use tenantry_core::repository::TenantDirectory;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::revocation::RevokedTokens;
use crate::token::{AccessTokenClaims, TokenValidator, ValidatedClaims};

/// Strip the `Bearer ` scheme from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MissingCredential)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingCredential);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}

pub struct TenantIdentityResolver<D: TenantDirectory, V: TokenValidator> {
    directory: D,
    validator: V,
    revoked: Arc<RevokedTokens>,
}

impl<D: TenantDirectory, V: TokenValidator> TenantIdentityResolver<D, V> {
    pub fn new(directory: D, validator: V, revoked: Arc<RevokedTokens>) -> Self {
        Self {
            directory,
            validator,
            revoked,
        }
    }

    /// Validate `token`, reject it if revoked, then resolve its claims.
    pub async fn resolve_principal(&self, token: &str) -> TenantryResult<AuthenticatedPrincipal> {
        let claims = self.validator.validate(token)?;
        if self.revoked.is_revoked(&claims.0.jti) {
            debug!(jti = %claims.0.jti, "Revoked token presented");
            return Err(AuthError::TokenRevoked.into());
        }
        self.resolve(&claims).await
    }

    /// Map verified claims to a principal. The tenant must exist, be
    /// active and be fully provisioned.
    pub async fn resolve(&self, claims: &ValidatedClaims) -> TenantryResult<AuthenticatedPrincipal> {
        let claims = &claims.0;
        let (tenant_id, role, user_id) = parse_claims(claims)?;

        let tenant = match self.directory.find_tenant(tenant_id).await {
            Ok(tenant) => tenant,
            Err(TenantryError::NotFound { .. }) => {
                warn!(%tenant_id, username = %claims.sub, "Token names an unknown tenant");
                return Err(TenantryError::unauthenticated("unknown tenant"));
            }
            Err(e) => return Err(e),
        };
        if !tenant.is_serviceable() {
            warn!(
                %tenant_id,
                status = %tenant.status.as_str(),
                is_active = tenant.is_active,
                "Token for a tenant that is not serviceable"
            );
            return Err(AuthError::TenantUnavailable.into());
        }

        Ok(AuthenticatedPrincipal {
            tenant_id,
            username: claims.sub.clone(),
            role,
            user_id,
        })
    }
}

fn parse_claims(claims: &AccessTokenClaims) -> Result<(Uuid, Role, Option<Uuid>), AuthError> {
    if claims.sub.trim().is_empty() {
        return Err(AuthError::TokenInvalid("empty subject".into()));
    }
    let tenant_id = Uuid::parse_str(&claims.tenant_id)
        .map_err(|_| AuthError::TokenInvalid("malformed tenant_id".into()))?;
    let role = claims
        .role
        .parse::<Role>()
        .map_err(|_| AuthError::TokenInvalid(format!("unknown role '{}'", claims.role)))?;
    let user_id = claims
        .uid
        .as_deref()
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|_| AuthError::TokenInvalid("malformed uid".into()))?;
    Ok((tenant_id, role, user_id))
}
