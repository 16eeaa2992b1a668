//! Wire views of stored records. Secrets and hashes never leave this module.

use jiff::Timestamp;
use portico_app::{
    auth::Session,
    store::records::{AccessTokenRecord, Role, UserId, UserRecord, UserStatus},
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::{
    pipeline::CallResult,
    rpc::{Reply, Status},
};

#[derive(Debug, Serialize)]
pub(crate) struct UserView {
    pub(crate) id: UserId,
    pub(crate) username: String,
    pub(crate) nickname: String,
    pub(crate) email: String,
    pub(crate) role: Role,
    pub(crate) status: UserStatus,
    pub(crate) created_at: Timestamp,
    pub(crate) updated_at: Timestamp,
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            nickname: user.nickname.clone(),
            email: user.email.clone(),
            role: user.role,
            status: user.status,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AccessTokenView {
    pub(crate) uuid: Uuid,
    pub(crate) user_id: UserId,
    pub(crate) description: String,
    pub(crate) created_at: Timestamp,
    pub(crate) expires_at: Option<Timestamp>,
    pub(crate) last_used_at: Option<Timestamp>,
}

impl From<&AccessTokenRecord> for AccessTokenView {
    fn from(record: &AccessTokenRecord) -> Self {
        Self {
            uuid: record.uuid,
            user_id: record.user_id,
            description: record.description.clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            last_used_at: record.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionView {
    pub(crate) access_token: String,
    pub(crate) access_token_expires_at: Timestamp,
    /// Only echoed to native clients, which have no cookie jar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) refresh_token: Option<String>,
    pub(crate) refresh_token_expires_at: Timestamp,
    pub(crate) user: UserView,
}

impl SessionView {
    pub(crate) fn new(session: &Session, echo_refresh_token: bool) -> Self {
        Self {
            access_token: session.access_token.token.clone(),
            access_token_expires_at: session.access_token.expires_at,
            refresh_token: echo_refresh_token.then(|| session.refresh_token.clone()),
            refresh_token_expires_at: session.refresh_expires_at,
            user: UserView::from(&session.user),
        }
    }
}

pub(crate) fn reply<T: Serialize>(value: &T) -> CallResult {
    serde_json::to_value(value).map(Reply::new).map_err(|source| {
        error!("failed to encode reply: {source}");
        Status::internal()
    })
}

pub(crate) fn ensure(allowed: bool) -> Result<(), Status> {
    if allowed {
        Ok(())
    } else {
        Err(Status::permission_denied(
            "caller may not perform this operation",
        ))
    }
}
