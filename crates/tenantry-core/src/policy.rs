//! Role-based authorization.
//!
//! The permission matrix is plain data ([`PERMISSIONS`]) so that it can be
//! inspected and tested independently of the call sites that consult it.

use std::fmt;

use tracing::debug;
use uuid::Uuid;

use crate::error::{TenantryError, TenantryResult};
use crate::models::principal::AuthenticatedPrincipal;
use crate::models::user::Role;

/// Classes of operation guarded by the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ManageUsers,
    ManageResources,
    ReadResources,
    ManageTenants,
    ReadAuditLogs,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::ManageUsers => "manage users",
            Action::ManageResources => "manage resources",
            Action::ReadResources => "read resources",
            Action::ManageTenants => "manage tenants",
            Action::ReadAuditLogs => "read audit logs",
        })
    }
}

/// Role × action permission matrix.
pub const PERMISSIONS: &[(Role, &[Action])] = &[
    (
        Role::SuperAdmin,
        &[
            Action::ManageUsers,
            Action::ManageResources,
            Action::ReadResources,
            Action::ManageTenants,
            Action::ReadAuditLogs,
        ],
    ),
    (
        Role::Admin,
        &[
            Action::ManageUsers,
            Action::ManageResources,
            Action::ReadResources,
            Action::ManageTenants,
            Action::ReadAuditLogs,
        ],
    ),
    (
        Role::Manager,
        &[Action::ManageResources, Action::ReadResources],
    ),
    (Role::Employee, &[Action::ReadResources]),
];

/// Whether `role` may perform `action` at all.
pub fn permits(role: Role, action: Action) -> bool {
    PERMISSIONS
        .iter()
        .find(|(r, _)| *r == role)
        .is_some_and(|(_, actions)| actions.contains(&action))
}

/// Platform operators manage tenants other than their own.
fn crosses_tenants(role: Role, action: Action) -> bool {
    role == Role::SuperAdmin && action == Action::ManageTenants
}

/// Stateless allow/deny evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationGuard;

impl AuthorizationGuard {
    /// Role check plus tenant-ownership check. Must be called before the
    /// guarded operation touches any data.
    pub fn authorize(
        &self,
        principal: &AuthenticatedPrincipal,
        action: Action,
        target_tenant_id: Uuid,
    ) -> TenantryResult<()> {
        self.authorize_role(principal, action)?;

        if principal.tenant_id != target_tenant_id && !crosses_tenants(principal.role, action) {
            debug!(
                username = %principal.username,
                principal_tenant = %principal.tenant_id,
                target_tenant = %target_tenant_id,
                %action,
                "Tenant mismatch"
            );
            return Err(TenantryError::denied("tenant mismatch"));
        }

        Ok(())
    }

    /// Role check alone, for actions without a target tenant (tenant
    /// creation).
    pub fn authorize_role(
        &self,
        principal: &AuthenticatedPrincipal,
        action: Action,
    ) -> TenantryResult<()> {
        if !permits(principal.role, action) {
            debug!(
                username = %principal.username,
                role = %principal.role,
                %action,
                "Role does not permit action"
            );
            return Err(TenantryError::denied(format!(
                "role {} may not {action}",
                principal.role
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, tenant_id: Uuid) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            tenant_id,
            username: "alice".into(),
            role,
            user_id: None,
        }
    }

    #[test]
    fn matrix_matches_policy() {
        use Action::*;
        let expected = [
            (Role::Admin, [true, true, true, true, true]),
            (Role::Manager, [false, true, true, false, false]),
            (Role::Employee, [false, false, true, false, false]),
        ];
        for (role, row) in expected {
            for (action, allowed) in [
                ManageUsers,
                ManageResources,
                ReadResources,
                ManageTenants,
                ReadAuditLogs,
            ]
            .into_iter()
            .zip(row)
            {
                assert_eq!(permits(role, action), allowed, "{role} / {action}");
            }
        }
    }

    #[test]
    fn every_role_has_a_row() {
        for role in [Role::Admin, Role::Manager, Role::Employee, Role::SuperAdmin] {
            assert!(PERMISSIONS.iter().any(|(r, _)| *r == role));
        }
    }

    #[test]
    fn ownership_mismatch_denied_even_for_admin() {
        let guard = AuthorizationGuard;
        let p = principal(Role::Admin, Uuid::new_v4());
        let err = guard
            .authorize(&p, Action::ManageResources, Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, TenantryError::AuthorizationDenied { .. }));
    }

    #[test]
    fn role_is_checked_before_ownership() {
        let guard = AuthorizationGuard;
        let tenant = Uuid::new_v4();
        let p = principal(Role::Employee, tenant);
        let err = guard
            .authorize(&p, Action::ManageResources, tenant)
            .unwrap_err();
        assert!(err.to_string().contains("may not manage resources"));
        assert!(guard.authorize(&p, Action::ReadResources, tenant).is_ok());
    }

    #[test]
    fn super_admin_crosses_tenants_only_for_tenant_management() {
        let guard = AuthorizationGuard;
        let p = principal(Role::SuperAdmin, Uuid::new_v4());
        let other = Uuid::new_v4();
        assert!(guard.authorize(&p, Action::ManageTenants, other).is_ok());
        assert!(guard.authorize(&p, Action::ManageResources, other).is_err());
    }
}
