//! Authenticated principal.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::Role;

/// Identity derived from a request's credential. Threaded explicitly
/// through every call; there is no ambient "current tenant".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    pub tenant_id: Uuid,
    pub username: String,
    pub role: Role,
    /// Present when the credential names the stored user.
    pub user_id: Option<Uuid>,
}

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    System,
    User(Option<Uuid>),
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::System => None,
            Actor::User(id) => *id,
        }
    }
}

impl From<&AuthenticatedPrincipal> for Actor {
    fn from(principal: &AuthenticatedPrincipal) -> Self {
        Actor::User(principal.user_id)
    }
}
