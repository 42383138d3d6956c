//! Quota limits and deployment-wide defaults.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tenant::Tenant;

/// Which configured limit a create would exceed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuotaLimit {
    UsersPerTenant,
    ResourcesPerTenant,
    ResourcesPerUser,
}

impl fmt::Display for QuotaLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuotaLimit::UsersPerTenant => "users per tenant",
            QuotaLimit::ResourcesPerTenant => "resources per tenant",
            QuotaLimit::ResourcesPerUser => "resources per user",
        })
    }
}

/// What is about to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    User,
    Resource { owner_id: Uuid },
}

/// Limits applied when a tenant leaves a quota unset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaDefaults {
    pub max_users: u32,
    pub max_resources: u32,
    pub max_resources_per_user: u32,
}

impl Default for QuotaDefaults {
    fn default() -> Self {
        Self {
            max_users: 50,
            max_resources: 500,
            max_resources_per_user: 10,
        }
    }
}

/// Limits in force for one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveQuota {
    pub max_users: u64,
    pub max_resources: u64,
    pub max_resources_per_user: u64,
}

impl EffectiveQuota {
    pub fn for_tenant(tenant: &Tenant, defaults: &QuotaDefaults) -> Self {
        Self {
            max_users: tenant.max_users.unwrap_or(defaults.max_users).into(),
            max_resources: tenant.max_resources.unwrap_or(defaults.max_resources).into(),
            max_resources_per_user: tenant
                .max_resources_per_user
                .unwrap_or(defaults.max_resources_per_user)
                .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::tenant::TenantStatus;

    #[test]
    fn tenant_overrides_win_over_defaults() {
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            schema_name: "acme".into(),
            max_users: Some(3),
            max_resources: None,
            max_resources_per_user: Some(1),
            is_active: true,
            status: TenantStatus::Ready,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let quota = EffectiveQuota::for_tenant(&tenant, &QuotaDefaults::default());
        assert_eq!(quota.max_users, 3);
        assert_eq!(quota.max_resources, 500);
        assert_eq!(quota.max_resources_per_user, 1);
    }
}
