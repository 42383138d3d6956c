//! Fixed-size pool of SurrealDB sessions.
//!
//! Each pooled entry is an independent session, so the namespace/database
//! selected on one never leaks into another. A [`SchemaLease`] owns its
//! session exclusively until dropped; dropping it (including when the
//! owning future is cancelled) marks the session unbound and returns it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use surrealdb::{Connection, Surreal};
use tenantry_core::error::{TenantryError, TenantryResult};
use tenantry_core::models::tenant::{PUBLIC_SCHEMA, Tenant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbError;

/// What a pooled session is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaBinding {
    Unbound,
    Public,
    Tenant { tenant_id: Uuid, schema: String },
}

struct PooledConnection<C: Connection> {
    id: usize,
    db: Surreal<C>,
    binding: SchemaBinding,
}

struct PoolInner<C: Connection> {
    namespace: String,
    idle: Mutex<Vec<PooledConnection<C>>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
    size: usize,
}

impl<C: Connection> PoolInner<C> {
    fn idle(&self) -> MutexGuard<'_, Vec<PooledConnection<C>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to the pool. Cheap to clone.
pub struct SchemaPool<C: Connection> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connection> Clone for SchemaPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> SchemaPool<C> {
    /// Build a pool over already-authenticated sessions.
    ///
    /// Every element is its own session. `Surreal::clone` opens a new
    /// session on the same connection that starts from a copy of the
    /// original's namespace and database, so `(0..n).map(|_| db.clone())`
    /// yields a valid pool.
    pub fn new(
        sessions: Vec<Surreal<C>>,
        namespace: impl Into<String>,
        acquire_timeout: Duration,
    ) -> Self {
        let size = sessions.len();
        let idle = sessions
            .into_iter()
            .enumerate()
            .map(|(id, db)| PooledConnection {
                id,
                db,
                binding: SchemaBinding::Unbound,
            })
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                namespace: namespace.into(),
                idle: Mutex::new(idle),
                permits: Arc::new(Semaphore::new(size)),
                acquire_timeout,
                size,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Sessions not currently leased.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Stop handing out sessions. Pending and future checkouts fail.
    pub fn close(&self) {
        self.inner.permits.close();
    }

    /// Take an unbound session out of the pool, waiting at most the
    /// configured acquire timeout.
    pub(crate) async fn checkout(&self) -> Result<SchemaLease<C>, DbError> {
        let permit = tokio::time::timeout(
            self.inner.acquire_timeout,
            Arc::clone(&self.inner.permits).acquire_owned(),
        )
        .await
        .map_err(|_| DbError::PoolTimeout(self.inner.acquire_timeout))?
        .map_err(|_| DbError::PoolClosed)?;

        let conn = self
            .inner
            .idle()
            .pop()
            .ok_or_else(|| DbError::Binding("permit granted but no idle session".into()))?;

        debug!(connection_id = conn.id, "Session checked out");
        Ok(SchemaLease {
            conn,
            pool: Arc::clone(&self.inner),
            _permit: permit,
            tenant: None,
        })
    }
}

/// Exclusive use of one pooled session.
///
/// On drop the session is pushed back to the idle list before the permit
/// field is released, so a granted permit always finds a session.
pub struct SchemaLease<C: Connection> {
    conn: PooledConnection<C>,
    pool: Arc<PoolInner<C>>,
    _permit: OwnedSemaphorePermit,
    tenant: Option<Tenant>,
}

impl<C: Connection> SchemaLease<C> {
    pub fn connection_id(&self) -> usize {
        self.conn.id
    }

    pub fn binding(&self) -> &SchemaBinding {
        &self.conn.binding
    }

    pub(crate) fn db(&self) -> &Surreal<C> {
        &self.conn.db
    }

    /// The registry row this lease was bound with.
    pub fn tenant(&self) -> TenantryResult<&Tenant> {
        match (&self.conn.binding, &self.tenant) {
            (SchemaBinding::Tenant { .. }, Some(tenant)) => Ok(tenant),
            _ => Err(TenantryError::Infrastructure(
                "session is not bound to a tenant schema".into(),
            )),
        }
    }

    /// Tenant id of the bound schema; errors on any other binding.
    pub fn tenant_scope(&self) -> TenantryResult<Uuid> {
        match &self.conn.binding {
            SchemaBinding::Tenant { tenant_id, .. } => Ok(*tenant_id),
            other => Err(TenantryError::Infrastructure(format!(
                "tenant-scoped query on a session bound to {other:?}"
            ))),
        }
    }

    pub fn public_scope(&self) -> TenantryResult<()> {
        match &self.conn.binding {
            SchemaBinding::Public => Ok(()),
            other => Err(TenantryError::Infrastructure(format!(
                "registry query on a session bound to {other:?}"
            ))),
        }
    }

    pub(crate) async fn bind_public(&mut self) -> Result<(), DbError> {
        self.tenant = None;
        let namespace = self.pool.namespace.clone();
        let conn = &mut self.conn;
        conn.binding = SchemaBinding::Unbound;
        conn.db.use_ns(namespace).use_db(PUBLIC_SCHEMA).await?;
        conn.binding = SchemaBinding::Public;
        Ok(())
    }

    /// Select the tenant's database. The caller is responsible for
    /// verifying the schema marker before running tenant queries.
    pub(crate) async fn bind_tenant(&mut self, tenant: &Tenant) -> Result<(), DbError> {
        self.tenant = None;
        let namespace = self.pool.namespace.clone();
        let conn = &mut self.conn;
        conn.binding = SchemaBinding::Unbound;
        conn.db
            .use_ns(namespace)
            .use_db(tenant.schema_name.as_str())
            .await?;
        conn.binding = SchemaBinding::Tenant {
            tenant_id: tenant.id,
            schema: tenant.schema_name.clone(),
        };
        self.tenant = Some(tenant.clone());
        Ok(())
    }
}

impl<C: Connection> Drop for SchemaLease<C> {
    fn drop(&mut self) {
        debug!(connection_id = self.conn.id, "Session returned");
        // Cloning would fork a new session; move the leased one back and
        // leave a detached handle behind.
        let db = std::mem::replace(&mut self.conn.db, Surreal::init());
        self.pool.idle().push(PooledConnection {
            id: self.conn.id,
            db,
            binding: SchemaBinding::Unbound,
        });
    }
}
