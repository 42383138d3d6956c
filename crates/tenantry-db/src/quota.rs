//! Quota admission for user and resource creation.
//!
//! Check and insert form one unit per tenant: [`QuotaEnforcer::check_and_reserve`]
//! takes the tenant's lock, counts live rows, and hands back a
//! [`QuotaReservation`] that keeps the lock until the caller has inserted
//! the row and dropped it. Concurrent creates in one tenant are therefore
//! serialized within this process; creates in different tenants are not.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use surrealdb::Connection;
use tenantry_core::error::{TenantryError, TenantryResult};
use tenantry_core::models::quota::{EffectiveQuota, QuotaDefaults, QuotaKind, QuotaLimit};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};
use uuid::Uuid;

use crate::pool::SchemaLease;
use crate::repository::{SurrealResourceRepository, SurrealUserRepository};

/// Admission ticket for exactly one insert. Drop it once the insert has
/// committed (or failed).
#[must_use = "the quota lock is released as soon as the reservation is dropped"]
pub struct QuotaReservation {
    tenant_id: Uuid,
    kind: QuotaKind,
    _guard: OwnedMutexGuard<()>,
}

impl QuotaReservation {
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn kind(&self) -> QuotaKind {
        self.kind
    }
}

#[derive(Default)]
pub struct QuotaEnforcer {
    defaults: QuotaDefaults,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl QuotaEnforcer {
    pub fn new(defaults: QuotaDefaults) -> Self {
        Self {
            defaults,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn defaults(&self) -> &QuotaDefaults {
        &self.defaults
    }

    fn lock_for(&self, tenant_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(tenant_id).or_default())
    }

    /// Drop the lock entry of a deleted tenant.
    pub fn forget(&self, tenant_id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(&tenant_id);
    }

    /// Admit one create of `kind` in the lease's tenant, or fail with
    /// `QuotaExceeded` naming the limit. Nothing is written either way.
    pub async fn check_and_reserve<C: Connection>(
        &self,
        lease: &SchemaLease<C>,
        kind: QuotaKind,
    ) -> TenantryResult<QuotaReservation> {
        let tenant = lease.tenant()?;
        let tenant_id = tenant.id;
        let quota = EffectiveQuota::for_tenant(tenant, &self.defaults);

        let guard = self.lock_for(tenant_id).lock_owned().await;

        match kind {
            QuotaKind::User => {
                let users = SurrealUserRepository::scoped(lease)?.count_live().await?;
                admit(tenant_id, QuotaLimit::UsersPerTenant, users, quota.max_users)?;
            }
            QuotaKind::Resource { owner_id } => {
                let repo = SurrealResourceRepository::scoped(lease)?;
                let total = repo.count_live().await?;
                admit(
                    tenant_id,
                    QuotaLimit::ResourcesPerTenant,
                    total,
                    quota.max_resources,
                )?;
                let owned = repo.count_live_by_owner(owner_id).await?;
                admit(
                    tenant_id,
                    QuotaLimit::ResourcesPerUser,
                    owned,
                    quota.max_resources_per_user,
                )?;
            }
        }

        debug!(tenant_id = %tenant_id, ?kind, "Quota reserved");
        Ok(QuotaReservation {
            tenant_id,
            kind,
            _guard: guard,
        })
    }
}

fn admit(tenant_id: Uuid, limit: QuotaLimit, current: u64, max: u64) -> TenantryResult<()> {
    if current >= max {
        info!(tenant_id = %tenant_id, %limit, current, max, "Quota exceeded");
        return Err(TenantryError::QuotaExceeded { limit, max });
    }
    Ok(())
}
