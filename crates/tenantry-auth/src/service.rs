//! Authentication service: login and logout orchestration.

use std::sync::Arc;

use tenantry_core::audit::AuditQueue;
use tenantry_core::error::{TenantryError, TenantryResult};
use tenantry_core::models::audit::{AuditAction, EntityType, NewAuditEntry};
use tenantry_core::models::principal::AuthenticatedPrincipal;
use tenantry_core::repository::{AuditSink, CredentialStore, TenantDirectory};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password;
use crate::revocation::RevokedTokens;
use crate::token;

#[derive(Debug)]
pub struct LoginInput {
    pub tenant_id: Uuid,
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct LoginOutput {
    /// Signed JWT access token.
    pub access_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub principal: AuthenticatedPrincipal,
}

/// Generic over the directory, credential and audit seams so that the
/// auth layer has no dependency on the database crate.
pub struct AuthService<D: TenantDirectory, S: CredentialStore, A: AuditSink> {
    directory: D,
    credentials: S,
    audit: AuditQueue<A>,
    revoked: Arc<RevokedTokens>,
    config: AuthConfig,
}

impl<D: TenantDirectory, S: CredentialStore, A: AuditSink> AuthService<D, S, A> {
    pub fn new(
        directory: D,
        credentials: S,
        audit: AuditQueue<A>,
        revoked: Arc<RevokedTokens>,
        config: AuthConfig,
    ) -> Self {
        Self {
            directory,
            credentials,
            audit,
            revoked,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Check a username and password inside one tenant and issue a token.
    ///
    /// Unknown tenants, unknown users and wrong passwords all fail with the
    /// same message. Every attempt against an existing tenant is audited.
    pub async fn login(&self, input: LoginInput) -> TenantryResult<LoginOutput> {
        let tenant = match self.directory.find_tenant(input.tenant_id).await {
            Ok(tenant) => tenant,
            Err(TenantryError::NotFound { .. }) => {
                warn!(tenant_id = %input.tenant_id, "Login against unknown tenant");
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };
        if !tenant.is_serviceable() {
            self.record_failure(input.tenant_id, None, &input.username, "tenant unavailable");
            return Err(AuthError::TenantUnavailable.into());
        }

        let credentials = match self
            .credentials
            .find_credentials(input.tenant_id, &input.username)
            .await
        {
            Ok(credentials) => credentials,
            Err(TenantryError::NotFound { .. }) => {
                self.record_failure(input.tenant_id, None, &input.username, "unknown user");
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };

        let valid = password::verify_password(
            &input.password,
            &credentials.password_hash,
            self.config.pepper.as_deref(),
        )?;
        if !valid {
            self.record_failure(
                input.tenant_id,
                Some(credentials.user_id),
                &input.username,
                "wrong password",
            );
            return Err(AuthError::InvalidCredentials.into());
        }

        let principal = AuthenticatedPrincipal {
            tenant_id: credentials.tenant_id,
            username: credentials.username,
            role: credentials.role,
            user_id: Some(credentials.user_id),
        };
        let access_token = token::issue_access_token(&principal, &self.config)?;

        info!(
            tenant_id = %principal.tenant_id,
            username = %principal.username,
            "Login succeeded"
        );
        self.audit.submit(
            NewAuditEntry::new(
                principal.tenant_id,
                AuditAction::LoginSuccess,
                format!("User {} logged in", principal.username),
            )
            .by(principal.user_id)
            .entity(EntityType::User, credentials.user_id),
        );

        Ok(LoginOutput {
            access_token,
            expires_in: self.config.access_token_lifetime_secs,
            principal,
        })
    }

    /// Revoke `token` for the rest of its lifetime. A token can only be
    /// logged out once.
    pub async fn logout(&self, token: &str) -> TenantryResult<()> {
        let claims = token::decode_access_token(token, &self.config)?;
        let tenant_id = Uuid::parse_str(&claims.tenant_id)
            .map_err(|_| AuthError::TokenInvalid("malformed tenant_id".into()))?;
        let user_id = claims.uid.as_deref().and_then(|id| Uuid::parse_str(id).ok());

        if !self.revoked.revoke(&claims.jti, claims.exp) {
            return Err(AuthError::TokenRevoked.into());
        }

        info!(%tenant_id, username = %claims.sub, jti = %claims.jti, "Token revoked");
        let mut entry = NewAuditEntry::new(
            tenant_id,
            AuditAction::Logout,
            format!("User {} logged out", claims.sub),
        )
        .by(user_id);
        if let Some(id) = user_id {
            entry = entry.entity(EntityType::User, id);
        }
        self.audit.submit(entry);
        Ok(())
    }

    fn record_failure(
        &self,
        tenant_id: Uuid,
        user_id: Option<Uuid>,
        username: &str,
        reason: &str,
    ) {
        warn!(%tenant_id, %username, reason, "Login failed");
        let mut entry = NewAuditEntry::new(
            tenant_id,
            AuditAction::LoginFailure,
            format!("Failed login for {username}: {reason}"),
        );
        if let Some(id) = user_id {
            entry = entry.entity(EntityType::User, id);
        }
        self.audit.submit(entry);
    }
}
