//! Server configuration, read from `TENANTRY_*` environment variables.
//!
//! Every variable is optional except the JWT key pair; unset values fall
//! back to the component defaults.

use std::time::Duration;

use tenantry_auth::AuthConfig;
use tenantry_core::audit::AuditConfig;
use tenantry_core::models::quota::QuotaDefaults;
use tenantry_db::DbConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub auth: AuthConfig,
    pub quota: QuotaDefaults,
    pub audit: AuditConfig,
    /// How often dead-lettered audit entries are retried. Zero disables
    /// the background replay.
    pub audit_replay_interval: Duration,
}

impl ServerConfig {
    /// Load from the process environment, after applying a `.env` file
    /// if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_defaults = DbConfig::default();
        let auth_defaults = AuthConfig::default();
        let quota_defaults = QuotaDefaults::default();
        let audit_defaults = AuditConfig::default();

        let text = |key: &str, default: String| lookup(key).unwrap_or(default);

        let db = DbConfig {
            url: text("TENANTRY_DB_URL", db_defaults.url),
            namespace: text("TENANTRY_DB_NAMESPACE", db_defaults.namespace),
            username: text("TENANTRY_DB_USERNAME", db_defaults.username),
            password: text("TENANTRY_DB_PASSWORD", db_defaults.password),
            pool_size: parse(&lookup, "TENANTRY_DB_POOL_SIZE", db_defaults.pool_size)?,
            acquire_timeout: Duration::from_millis(parse(
                &lookup,
                "TENANTRY_DB_ACQUIRE_TIMEOUT_MS",
                millis(db_defaults.acquire_timeout),
            )?),
        };
        if db.pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "TENANTRY_DB_POOL_SIZE",
                value: "0".into(),
            });
        }

        let auth = AuthConfig {
            jwt_private_key_pem: lookup("TENANTRY_JWT_PRIVATE_KEY_PEM")
                .ok_or(ConfigError::Missing("TENANTRY_JWT_PRIVATE_KEY_PEM"))?,
            jwt_public_key_pem: lookup("TENANTRY_JWT_PUBLIC_KEY_PEM")
                .ok_or(ConfigError::Missing("TENANTRY_JWT_PUBLIC_KEY_PEM"))?,
            access_token_lifetime_secs: parse(
                &lookup,
                "TENANTRY_ACCESS_TOKEN_LIFETIME_SECS",
                auth_defaults.access_token_lifetime_secs,
            )?,
            jwt_issuer: text("TENANTRY_JWT_ISSUER", auth_defaults.jwt_issuer),
            pepper: lookup("TENANTRY_PASSWORD_PEPPER").filter(|p| !p.is_empty()),
        };

        let quota = QuotaDefaults {
            max_users: parse(&lookup, "TENANTRY_DEFAULT_MAX_USERS", quota_defaults.max_users)?,
            max_resources: parse(
                &lookup,
                "TENANTRY_DEFAULT_MAX_RESOURCES",
                quota_defaults.max_resources,
            )?,
            max_resources_per_user: parse(
                &lookup,
                "TENANTRY_DEFAULT_MAX_RESOURCES_PER_USER",
                quota_defaults.max_resources_per_user,
            )?,
        };

        let audit = AuditConfig {
            max_attempts: parse(
                &lookup,
                "TENANTRY_AUDIT_MAX_ATTEMPTS",
                audit_defaults.max_attempts,
            )?,
            initial_backoff: Duration::from_millis(parse(
                &lookup,
                "TENANTRY_AUDIT_BACKOFF_MS",
                millis(audit_defaults.initial_backoff),
            )?),
            dead_letter_capacity: parse(
                &lookup,
                "TENANTRY_AUDIT_DEAD_LETTER_CAPACITY",
                audit_defaults.dead_letter_capacity,
            )?,
            queue_capacity: parse(
                &lookup,
                "TENANTRY_AUDIT_QUEUE_CAPACITY",
                audit_defaults.queue_capacity,
            )?,
        };

        let audit_replay_interval = Duration::from_secs(parse(
            &lookup,
            "TENANTRY_AUDIT_REPLAY_INTERVAL_SECS",
            30,
        )?);

        Ok(Self {
            db,
            auth,
            quota,
            audit,
            audit_replay_interval,
        })
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
