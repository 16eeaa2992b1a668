//! Store Records

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::StoreError;

/// User identifier.
pub type UserId = i64;

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Ordinary account.
    Regular,

    /// Instance administrator.
    Admin,

    /// Machine account used by integrations.
    Service,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Admin => "admin",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "regular" => Ok(Self::Regular),
            "admin" => Ok(Self::Admin),
            "service" => Ok(Self::Service),
            other => Err(StoreError::InvalidData(format!("unknown role `{other}`"))),
        }
    }
}

/// User lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Archived,
}

impl UserStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for UserStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(StoreError::InvalidData(format!("unknown status `{other}`"))),
        }
    }
}

/// User Record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Unique user identifier.
    pub id: UserId,

    /// Unique login name.
    pub username: String,

    /// Display name.
    pub nickname: String,

    /// Contact email, may be empty.
    pub email: String,

    pub role: Role,

    pub status: UserStatus,

    /// Argon2 PHC string.
    pub password_hash: String,

    pub created_at: Timestamp,

    pub updated_at: Timestamp,
}

impl UserRecord {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Refresh token row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    /// Opaque token identifier, also the cookie value.
    pub token_id: String,

    pub user_id: UserId,

    pub created_at: Timestamp,

    pub expires_at: Timestamp,

    pub revoked: bool,
}

impl RefreshTokenRecord {
    /// A refresh token is usable only when it is neither revoked nor expired.
    #[must_use]
    pub fn is_usable_at(&self, now: Timestamp) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Personal access token metadata persisted in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenRecord {
    pub uuid: Uuid,

    pub user_id: UserId,

    pub description: String,

    /// SHA-256 hex digest of the full token literal.
    pub token_hash: String,

    pub created_at: Timestamp,

    pub expires_at: Option<Timestamp>,

    pub last_used_at: Option<Timestamp>,
}

impl AccessTokenRecord {
    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}
