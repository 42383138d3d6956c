//! Audit log domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TenantryError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CreatedUser,
    UpdatedUser,
    DeletedUser,
    CreatedResource,
    UpdatedResource,
    DeletedResource,
    CreatedTenant,
    UpdatedTenant,
    DeletedTenant,
    LoginSuccess,
    LoginFailure,
    Logout,
}

impl AuditAction {
    pub const ALL: [AuditAction; 12] = [
        AuditAction::CreatedUser,
        AuditAction::UpdatedUser,
        AuditAction::DeletedUser,
        AuditAction::CreatedResource,
        AuditAction::UpdatedResource,
        AuditAction::DeletedResource,
        AuditAction::CreatedTenant,
        AuditAction::UpdatedTenant,
        AuditAction::DeletedTenant,
        AuditAction::LoginSuccess,
        AuditAction::LoginFailure,
        AuditAction::Logout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CreatedUser => "CREATED_USER",
            AuditAction::UpdatedUser => "UPDATED_USER",
            AuditAction::DeletedUser => "DELETED_USER",
            AuditAction::CreatedResource => "CREATED_RESOURCE",
            AuditAction::UpdatedResource => "UPDATED_RESOURCE",
            AuditAction::DeletedResource => "DELETED_RESOURCE",
            AuditAction::CreatedTenant => "CREATED_TENANT",
            AuditAction::UpdatedTenant => "UPDATED_TENANT",
            AuditAction::DeletedTenant => "DELETED_TENANT",
            AuditAction::LoginSuccess => "LOGIN_SUCCESS",
            AuditAction::LoginFailure => "LOGIN_FAILURE",
            AuditAction::Logout => "LOGOUT",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = TenantryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| TenantryError::validation(format!("unknown audit action: {s}")))
    }
}

/// Kind of entity an audit entry refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntityType {
    User,
    Resource,
    Tenant,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "User",
            EntityType::Resource => "Resource",
            EntityType::Tenant => "Tenant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "User" => Some(EntityType::User),
            "Resource" => Some(EntityType::Resource),
            "Tenant" => Some(EntityType::Tenant),
            _ => None,
        }
    }
}

/// A persisted, immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// `None` for system-initiated actions.
    pub user_id: Option<Uuid>,
    pub tenant_id: Uuid,
    pub action: AuditAction,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

/// An audit event as reported by a service. Id and timestamp are assigned
/// by the recorder.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub user_id: Option<Uuid>,
    pub tenant_id: Uuid,
    pub action: AuditAction,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub details: String,
}

impl NewAuditEntry {
    pub fn new(tenant_id: Uuid, action: AuditAction, details: impl Into<String>) -> Self {
        Self {
            user_id: None,
            tenant_id,
            action,
            entity_type: None,
            entity_id: None,
            details: details.into(),
        }
    }

    pub fn by(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn entity(mut self, entity_type: EntityType, entity_id: Uuid) -> Self {
        self.entity_type = Some(entity_type);
        self.entity_id = Some(entity_id);
        self
    }
}

/// Query filters for audit log listings.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_match_stored_strings() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert_eq!(
            serde_json::to_string(&AuditAction::CreatedResource).unwrap(),
            "\"CREATED_RESOURCE\""
        );
    }

    #[test]
    fn builder_sets_actor_and_entity() {
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let entity = Uuid::new_v4();
        let entry = NewAuditEntry::new(tenant, AuditAction::DeletedUser, "Deleted user bob")
            .by(Some(user))
            .entity(EntityType::User, entity);
        assert_eq!(entry.user_id, Some(user));
        assert_eq!(entry.entity_type, Some(EntityType::User));
        assert_eq!(entry.entity_id, Some(entity));
    }
}
