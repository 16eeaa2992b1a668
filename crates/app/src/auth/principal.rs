//! Authenticated identity attached to a call.

use serde::Serialize;
use uuid::Uuid;

use crate::store::records::{Role, UserId};

/// How the caller proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialKind {
    AccessToken,
    PersonalAccessToken { token: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub credential: CredentialKind,
}

impl Principal {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins and service accounts may read every user.
    #[must_use]
    pub fn can_read_all_users(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Service)
    }

    /// Whether the caller may act on `user_id`'s own resources.
    #[must_use]
    pub fn can_manage(&self, user_id: UserId) -> bool {
        self.user_id == user_id || self.is_admin()
    }
}
