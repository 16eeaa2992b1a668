//! Store input and filter types.

use jiff::Timestamp;
use uuid::Uuid;

use crate::store::records::{Role, UserId, UserStatus};

/// New user persistence payload.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub nickname: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
}

/// Partial user update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub id: UserId,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub password_hash: Option<String>,
}

impl UpdateUser {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.nickname.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.status.is_none()
            && self.password_hash.is_none()
    }
}

/// User lookup criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindUser {
    pub id: Option<UserId>,
    pub username: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl FindUser {
    #[must_use]
    pub fn by_id(id: UserId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn by_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token_id: String,
    pub user_id: UserId,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Refresh token lookup criteria. Revoked rows are included so callers can
/// detect reuse of a rotated token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindRefreshToken {
    pub token_id: Option<String>,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub uuid: Uuid,
    pub user_id: UserId,
    pub description: String,
    pub token_hash: String,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindAccessToken {
    pub uuid: Option<Uuid>,
    pub user_id: Option<UserId>,
}
