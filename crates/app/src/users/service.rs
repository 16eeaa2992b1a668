//! Users service.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::info;

use crate::{
    auth::hash_password,
    store::{
        Store,
        data::{FindUser, NewUser, UpdateUser},
        records::{Role, UserId, UserRecord, UserStatus},
    },
    users::{UsersServiceError, validate_password, validate_username},
};

/// Account creation request.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub nickname: String,
    pub email: String,
    pub role: Role,
}

/// Partial account update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub id: UserId,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoreUsersService {
    store: Arc<Store>,
    allow_signup: bool,
}

impl StoreUsersService {
    #[must_use]
    pub fn new(store: Arc<Store>, allow_signup: bool) -> Self {
        Self {
            store,
            allow_signup,
        }
    }

    async fn prepare(account: NewAccount) -> Result<NewUser, UsersServiceError> {
        validate_username(&account.username)?;
        validate_password(&account.password)?;

        let password_hash = hash_password(&account.password).await?;

        Ok(NewUser {
            username: account.username,
            nickname: account.nickname,
            email: account.email,
            role: account.role,
            password_hash,
        })
    }
}

#[async_trait]
impl UsersService for StoreUsersService {
    async fn get_user(&self, id: UserId) -> Result<UserRecord, UsersServiceError> {
        Ok(self.store.get_user(id).await?)
    }

    async fn list_users(&self, find: FindUser) -> Result<Vec<UserRecord>, UsersServiceError> {
        Ok(self.store.list_users(find).await?)
    }

    async fn create_user(&self, account: NewAccount) -> Result<UserRecord, UsersServiceError> {
        let user = self.store.create_user(Self::prepare(account).await?).await?;

        info!(user_id = user.id, role = %user.role, "user created");

        Ok(user)
    }

    async fn sign_up(&self, account: NewAccount) -> Result<UserRecord, UsersServiceError> {
        // Skips the hash on a closed instance; the insert re-checks the gate.
        if !self.allow_signup && self.has_admin().await? {
            return Err(UsersServiceError::SignupDisabled);
        }

        // The first account on an instance becomes its administrator.
        let user = self
            .store
            .sign_up_user(Self::prepare(account).await?, self.allow_signup)
            .await?
            .ok_or(UsersServiceError::SignupDisabled)?;

        info!(user_id = user.id, role = %user.role, "user signed up");

        Ok(user)
    }

    async fn update_user(&self, patch: AccountPatch) -> Result<UserRecord, UsersServiceError> {
        if let Some(username) = &patch.username {
            validate_username(username)?;
        }

        let password_hash = match &patch.password {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password).await?)
            }
            None => None,
        };

        let update = UpdateUser {
            id: patch.id,
            username: patch.username,
            nickname: patch.nickname,
            email: patch.email,
            role: patch.role,
            status: patch.status,
            password_hash,
        };

        if update.is_empty() {
            return Err(UsersServiceError::EmptyUpdate);
        }

        Ok(self.store.update_user(update).await?)
    }

    async fn delete_user(&self, id: UserId) -> Result<(), UsersServiceError> {
        self.store.delete_user(id).await?;

        info!(user_id = id, "user deleted");

        Ok(())
    }

    async fn has_admin(&self) -> Result<bool, UsersServiceError> {
        let admins = self
            .store
            .list_users(FindUser {
                role: Some(Role::Admin),
                limit: Some(1),
                ..FindUser::default()
            })
            .await?;

        Ok(!admins.is_empty())
    }
}

#[automock]
#[async_trait]
pub trait UsersService: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<UserRecord, UsersServiceError>;

    async fn list_users(&self, find: FindUser) -> Result<Vec<UserRecord>, UsersServiceError>;

    async fn create_user(&self, account: NewAccount) -> Result<UserRecord, UsersServiceError>;

    /// Self-service registration. The requested role is ignored.
    async fn sign_up(&self, account: NewAccount) -> Result<UserRecord, UsersServiceError>;

    async fn update_user(&self, patch: AccountPatch) -> Result<UserRecord, UsersServiceError>;

    async fn delete_user(&self, id: UserId) -> Result<(), UsersServiceError>;

    async fn has_admin(&self) -> Result<bool, UsersServiceError>;
}
