//! User domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TenantryError, TenantryResult};

/// Role carried by a principal.
///
/// `SuperAdmin` is a platform operator role that only ever appears in
/// tokens; it cannot be assigned to a stored user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    Employee,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Employee => "EMPLOYEE",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Roles that may be stored on a tenant user.
    pub fn is_assignable(&self) -> bool {
        !matches!(self, Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TenantryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "MANAGER" => Ok(Role::Manager),
            "EMPLOYEE" => Ok(Role::Employee),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            other => Err(TenantryError::validation(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub tenant_id: Uuid,
    pub username: String,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
    pub role: Role,
}

impl CreateUser {
    pub fn validate(&self) -> TenantryResult<()> {
        let username = self.username.trim();
        if username.is_empty() || username.len() > 100 {
            return Err(TenantryError::validation("username must be 1-100 characters"));
        }
        if self.password.is_empty() {
            return Err(TenantryError::validation("password is required"));
        }
        if !self.role.is_assignable() {
            return Err(TenantryError::validation(format!(
                "role {} cannot be assigned to a user",
                self.role
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub role: Option<Role>,
    /// Raw replacement password.
    pub password: Option<String>,
}

impl UpdateUser {
    pub fn validate(&self) -> TenantryResult<()> {
        if self.role.is_none() && self.password.is_none() {
            return Err(TenantryError::validation("nothing to update"));
        }
        if let Some(role) = self.role {
            if !role.is_assignable() {
                return Err(TenantryError::validation(format!(
                    "role {role} cannot be assigned to a user"
                )));
            }
        }
        if self.password.as_deref().is_some_and(str::is_empty) {
            return Err(TenantryError::validation("password must not be empty"));
        }
        Ok(())
    }
}

/// The subset of a user needed to check a login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_strings_round_trip() {
        for role in [Role::Admin, Role::Manager, Role::Employee, Role::SuperAdmin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn super_admin_cannot_be_stored() {
        let input = CreateUser {
            tenant_id: Uuid::new_v4(),
            username: "root".into(),
            password: "pw".into(),
            role: Role::SuperAdmin,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(UpdateUser::default().validate().is_err());
        let update = UpdateUser {
            role: Some(Role::Manager),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
    }
}
