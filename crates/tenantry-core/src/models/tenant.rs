//! Tenant domain model.
//!
//! A tenant is an isolated organization whose users and resources live in
//! a dedicated database schema. The registry row in the `public` schema is
//! the source of truth for the tenant-to-schema mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TenantryError, TenantryResult};

/// Schema that holds the tenant registry and the audit log.
pub const PUBLIC_SCHEMA: &str = "public";

pub const MIN_SCHEMA_NAME_LEN: usize = 3;
pub const MAX_SCHEMA_NAME_LEN: usize = 63;
pub const MAX_TENANT_NAME_LEN: usize = 255;

/// Provisioning state of a tenant's schema.
///
/// Rows are inserted as `Provisioning` and flipped to `Ready` once the
/// schema exists. Only `Ready` tenants can be routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TenantStatus {
    Provisioning,
    Ready,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Provisioning => "Provisioning",
            TenantStatus::Ready => "Ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Provisioning" => Some(TenantStatus::Provisioning),
            "Ready" => Some(TenantStatus::Ready),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    /// Unique display name.
    pub name: String,
    /// Physical schema backing this tenant. Immutable after creation.
    pub schema_name: String,
    /// `None` falls back to the deployment default.
    pub max_users: Option<u32>,
    pub max_resources: Option<u32>,
    pub max_resources_per_user: Option<u32>,
    pub is_active: bool,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Whether requests may currently be served for this tenant.
    pub fn is_serviceable(&self) -> bool {
        self.is_active && self.status == TenantStatus::Ready
    }
}

/// Fields required to create a new tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub schema_name: String,
    pub max_users: Option<u32>,
    pub max_resources: Option<u32>,
    pub max_resources_per_user: Option<u32>,
}

impl CreateTenant {
    pub fn new(name: impl Into<String>, schema_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_name: schema_name.into(),
            max_users: None,
            max_resources: None,
            max_resources_per_user: None,
        }
    }

    pub fn validate(&self) -> TenantryResult<()> {
        let name = self.name.trim();
        if name.is_empty() || name.len() > MAX_TENANT_NAME_LEN {
            return Err(TenantryError::validation(format!(
                "tenant name must be 1-{MAX_TENANT_NAME_LEN} characters"
            )));
        }
        validate_schema_name(&self.schema_name)
    }
}

/// Fields that can be changed on an existing tenant. The schema name is
/// deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTenant {
    /// `Some(None)` clears the override so the default applies again.
    pub max_users: Option<Option<u32>>,
    pub max_resources: Option<Option<u32>>,
    pub max_resources_per_user: Option<Option<u32>>,
    pub is_active: Option<bool>,
}

impl UpdateTenant {
    pub fn is_empty(&self) -> bool {
        self.max_users.is_none()
            && self.max_resources.is_none()
            && self.max_resources_per_user.is_none()
            && self.is_active.is_none()
    }
}

/// Schema names are embedded in DDL, so they are restricted to a plain
/// identifier alphabet: lowercase ASCII letter first, then lowercase
/// letters, digits or underscores.
pub fn validate_schema_name(schema: &str) -> TenantryResult<()> {
    if schema.len() < MIN_SCHEMA_NAME_LEN || schema.len() > MAX_SCHEMA_NAME_LEN {
        return Err(TenantryError::validation(format!(
            "schema name must be {MIN_SCHEMA_NAME_LEN}-{MAX_SCHEMA_NAME_LEN} characters"
        )));
    }
    if schema == PUBLIC_SCHEMA {
        return Err(TenantryError::validation("schema name 'public' is reserved"));
    }
    let mut chars = schema.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !first_ok || !rest_ok {
        return Err(TenantryError::validation(format!(
            "schema name '{schema}' must match [a-z][a-z0-9_]*"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_schema_name("acme").is_ok());
        assert!(validate_schema_name("tenant_042").is_ok());
    }

    #[test]
    fn rejects_injection_and_reserved_names() {
        assert!(validate_schema_name("public").is_err());
        assert!(validate_schema_name("ab").is_err());
        assert!(validate_schema_name("Acme").is_err());
        assert!(validate_schema_name("9lives").is_err());
        assert!(validate_schema_name("acme; REMOVE NAMESPACE x").is_err());
        assert!(validate_schema_name("acme-corp").is_err());
    }

    #[test]
    fn blank_tenant_name_is_rejected() {
        let input = CreateTenant::new("   ", "acme");
        assert!(matches!(
            input.validate(),
            Err(TenantryError::Validation { .. })
        ));
    }

    #[test]
    fn only_ready_active_tenants_are_serviceable() {
        let mut tenant = Tenant {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            schema_name: "acme".into(),
            max_users: None,
            max_resources: None,
            max_resources_per_user: None,
            is_active: true,
            status: TenantStatus::Provisioning,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!tenant.is_serviceable());
        tenant.status = TenantStatus::Ready;
        assert!(tenant.is_serviceable());
        tenant.is_active = false;
        assert!(!tenant.is_serviceable());
    }
}
