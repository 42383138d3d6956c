//! Resource domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TenantryError, TenantryResult};

pub const MAX_DESCRIPTION_LEN: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResource {
    /// Must equal the caller's tenant.
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Defaults to the calling user when absent.
    pub owner_id: Option<Uuid>,
}

impl CreateResource {
    pub fn validate(&self) -> TenantryResult<()> {
        validate_name(&self.name)?;
        validate_description(self.description.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateResource {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

impl UpdateResource {
    pub fn validate(&self) -> TenantryResult<()> {
        if self.name.is_none() && self.description.is_none() {
            return Err(TenantryError::validation("nothing to update"));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(description) = &self.description {
            validate_description(description.as_deref())?;
        }
        Ok(())
    }
}

/// Optional filters for resource listings.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    /// Case-insensitive substring match on the name.
    pub name: Option<String>,
    pub owner_id: Option<Uuid>,
}

fn validate_name(name: &str) -> TenantryResult<()> {
    if name.trim().is_empty() {
        return Err(TenantryError::validation("resource name is required"));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> TenantryResult<()> {
    match description {
        Some(d) if d.len() > MAX_DESCRIPTION_LEN => Err(TenantryError::validation(format!(
            "description exceeds {MAX_DESCRIPTION_LEN} characters"
        ))),
        _ => Ok(()),
    }
}
