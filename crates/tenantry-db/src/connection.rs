//! SurrealDB connection management.

use std::time::Duration;

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::pool::SchemaPool;
use crate::schema::run_migrations;

/// Configuration for connecting to SurrealDB.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket URL (e.g., `127.0.0.1:8000`).
    pub url: String,
    /// Namespace holding `public` and every tenant database.
    pub namespace: String,
    /// Root username for authentication.
    pub username: String,
    /// Root password for authentication.
    pub password: String,
    /// Number of independent sessions in the pool.
    pub pool_size: usize,
    /// How long a caller waits for a free session.
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "tenantry".into(),
            username: "root".into(),
            password: "root".into(),
            pool_size: 8,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Open `pool_size` WebSocket sessions, authenticate each as root, and
/// apply pending migrations to the `public` database.
pub async fn connect_pool(config: &DbConfig) -> Result<SchemaPool<Client>, DbError> {
    info!(
        url = %config.url,
        namespace = %config.namespace,
        pool_size = config.pool_size,
        "Connecting to SurrealDB"
    );

    let mut sessions = Vec::with_capacity(config.pool_size);
    for _ in 0..config.pool_size.max(1) {
        let db = Surreal::new::<Ws>(&config.url).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        sessions.push(db);
    }

    if let Some(first) = sessions.first() {
        first
            .use_ns(&config.namespace)
            .use_db(tenantry_core::models::tenant::PUBLIC_SCHEMA)
            .await?;
        run_migrations(first).await?;
    }

    info!("Successfully connected to SurrealDB");

    Ok(SchemaPool::new(
        sessions,
        config.namespace.clone(),
        config.acquire_timeout,
    ))
}
