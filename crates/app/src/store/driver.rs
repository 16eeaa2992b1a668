//! Storage driver interface implemented once per backend.

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use uuid::Uuid;

use crate::store::{
    StoreError,
    data::{
        FindAccessToken, FindRefreshToken, FindUser, NewAccessToken, NewRefreshToken, NewUser,
        UpdateUser,
    },
    records::{AccessTokenRecord, RefreshTokenRecord, UserId, UserRecord},
};

#[automock]
#[async_trait]
pub trait Driver: Send + Sync {
    /// Whether the schema marker table exists.
    async fn is_initialized(&self) -> Result<bool, StoreError>;

    /// Execute raw schema statements and record `version` as the current
    /// schema version, all inside one transaction.
    async fn apply_schema(&self, statements: Vec<String>, version: String)
    -> Result<(), StoreError>;

    /// Recorded schema version, `None` before the first migration.
    async fn schema_version(&self) -> Result<Option<String>, StoreError>;

    async fn get_instance_setting(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Insert a setting unless one with the same name exists. Returns `true`
    /// when the row was written.
    async fn insert_instance_setting(&self, name: &str, value: &str)
    -> Result<bool, StoreError>;

    async fn upsert_instance_setting(&self, name: &str, value: &str) -> Result<(), StoreError>;

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    /// Self-registration insert. The role is decided by the same statement:
    /// `admin` when no administrator exists yet, `regular` otherwise, and the
    /// row is only written while `open_signup` is set or no administrator
    /// exists. `user.role` is ignored. Returns `None` when registration is
    /// closed.
    async fn sign_up_user(
        &self,
        user: NewUser,
        open_signup: bool,
    ) -> Result<Option<UserRecord>, StoreError>;

    async fn list_users(&self, find: FindUser) -> Result<Vec<UserRecord>, StoreError>;

    async fn update_user(&self, update: UpdateUser) -> Result<UserRecord, StoreError>;

    async fn delete_user(&self, id: UserId) -> Result<(), StoreError>;

    async fn create_refresh_token(
        &self,
        token: NewRefreshToken,
    ) -> Result<RefreshTokenRecord, StoreError>;

    async fn list_refresh_tokens(
        &self,
        find: FindRefreshToken,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError>;

    /// Revoke a single token. Returns `true` only for the caller that flipped
    /// the flag, so concurrent rotations of one token have a single winner.
    async fn revoke_refresh_token(&self, token_id: &str) -> Result<bool, StoreError>;

    async fn revoke_user_refresh_tokens(&self, user_id: UserId) -> Result<u64, StoreError>;

    async fn create_access_token(
        &self,
        token: NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError>;

    async fn list_access_tokens(
        &self,
        find: FindAccessToken,
    ) -> Result<Vec<AccessTokenRecord>, StoreError>;

    async fn touch_access_token(&self, uuid: Uuid, used_at: Timestamp) -> Result<(), StoreError>;

    async fn delete_access_token(&self, uuid: Uuid) -> Result<bool, StoreError>;

    /// Release pooled connections.
    async fn close(&self);
}
