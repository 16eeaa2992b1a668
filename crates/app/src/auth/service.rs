//! Auth service.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::{
        AccessTokenSigner, AuthConfig, AuthServiceError, CredentialKind, IssuedAccessToken,
        PersonalTokenSecret, PersonalTokenVersion, Principal, format_personal_token,
        generate_refresh_token_id, hash_personal_token, looks_like_personal_token,
        parse_personal_token, verify_password, verify_personal_token_hash,
    },
    store::{
        Store, StoreError,
        data::{NewAccessToken, NewRefreshToken},
        records::{AccessTokenRecord, UserId, UserRecord},
    },
};

/// Credentials handed out at sign-in and refresh.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserRecord,
    pub access_token: IssuedAccessToken,
    pub refresh_token: String,
    pub refresh_expires_at: Timestamp,
}

/// Personal access token creation result with the one-time plaintext.
#[derive(Debug, Clone)]
pub struct CreatedPersonalToken {
    pub token: String,
    pub record: AccessTokenRecord,
}

#[derive(Debug)]
pub struct StoreAuthService {
    store: Arc<Store>,
    config: Arc<AuthConfig>,
    signer: AccessTokenSigner,
}

impl StoreAuthService {
    #[must_use]
    pub fn new(store: Arc<Store>, config: Arc<AuthConfig>) -> Self {
        let signer = AccessTokenSigner::new(&config);

        Self {
            store,
            config,
            signer,
        }
    }

    fn authenticate_access_token(
        &self,
        token: &str,
        now: Timestamp,
    ) -> Result<Principal, AuthServiceError> {
        let claims = self
            .signer
            .verify(token, now)
            .map_err(AuthServiceError::InvalidAccessToken)?;

        Ok(Principal {
            user_id: claims
                .user_id()
                .map_err(AuthServiceError::InvalidAccessToken)?,
            username: claims.name,
            role: claims.role,
            credential: CredentialKind::AccessToken,
        })
    }

    async fn authenticate_personal_token(
        &self,
        token: &str,
        now: Timestamp,
    ) -> Result<Principal, AuthServiceError> {
        let parsed = parse_personal_token(token)
            .map_err(|error| AuthServiceError::InvalidPersonalToken(Some(error)))?;

        let record = self
            .store
            .find_access_token(parsed.uuid)
            .await?
            .ok_or(AuthServiceError::InvalidPersonalToken(None))?;

        if !verify_personal_token_hash(token, &record.token_hash) {
            return Err(AuthServiceError::InvalidPersonalToken(None));
        }

        if record.is_expired_at(now) {
            return Err(AuthServiceError::ExpiredPersonalToken);
        }

        let user = self.active_user(record.user_id).await?;

        // Best-effort metadata update; auth success does not depend on this write.
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(error) = store.touch_access_token(record.uuid, now).await {
                warn!(token = %record.uuid, "failed to record token use: {error}");
            }
        });

        Ok(Principal {
            user_id: user.id,
            username: user.username,
            role: user.role,
            credential: CredentialKind::PersonalAccessToken { token: parsed.uuid },
        })
    }

    async fn active_user(&self, id: UserId) -> Result<UserRecord, AuthServiceError> {
        let user = match self.store.get_user(id).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(AuthServiceError::InactiveUser),
            Err(error) => return Err(error.into()),
        };

        if !user.is_active() {
            return Err(AuthServiceError::InactiveUser);
        }

        Ok(user)
    }

    async fn open_session(
        &self,
        user: UserRecord,
        now: Timestamp,
    ) -> Result<Session, AuthServiceError> {
        let refresh_expires_at = now
            .checked_add(self.config.refresh_token_ttl)
            .map_err(|_| AuthServiceError::InvalidSecret)?;

        let refresh = self
            .store
            .create_refresh_token(NewRefreshToken {
                token_id: generate_refresh_token_id(),
                user_id: user.id,
                created_at: now,
                expires_at: refresh_expires_at,
            })
            .await?;

        let access_token = self
            .signer
            .issue(&user, now)
            .map_err(AuthServiceError::Signing)?;

        Ok(Session {
            user,
            access_token,
            refresh_token: refresh.token_id,
            refresh_expires_at: refresh.expires_at,
        })
    }
}

#[async_trait]
impl AuthService for StoreAuthService {
    async fn authenticate_bearer(&self, credential: &str) -> Result<Principal, AuthServiceError> {
        let now = Timestamp::now();

        if looks_like_personal_token(credential) {
            self.authenticate_personal_token(credential, now).await
        } else {
            self.authenticate_access_token(credential, now)
        }
    }

    async fn sign_in(&self, username: &str, password: &str) -> Result<Session, AuthServiceError> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or(AuthServiceError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash).await? {
            return Err(AuthServiceError::InvalidCredentials);
        }

        if !user.is_active() {
            return Err(AuthServiceError::InactiveUser);
        }

        debug!(user_id = user.id, "user signed in");

        self.open_session(user, Timestamp::now()).await
    }

    async fn issue_session(&self, user: &UserRecord) -> Result<Session, AuthServiceError> {
        self.open_session(user.clone(), Timestamp::now()).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthServiceError> {
        let now = Timestamp::now();

        let record = self
            .store
            .find_refresh_token(refresh_token)
            .await?
            .ok_or(AuthServiceError::InvalidRefreshToken)?;

        if record.revoked {
            let revoked = self
                .store
                .revoke_user_refresh_tokens(record.user_id)
                .await?;

            warn!(
                user_id = record.user_id,
                revoked, "revoked refresh token presented again, revoking all sessions"
            );

            return Err(AuthServiceError::RefreshTokenReused);
        }

        if !record.is_usable_at(now) {
            return Err(AuthServiceError::InvalidRefreshToken);
        }

        // Single use: only the caller that flips the flag may rotate.
        if !self.store.revoke_refresh_token(refresh_token).await? {
            return Err(AuthServiceError::InvalidRefreshToken);
        }

        let user = self.active_user(record.user_id).await?;

        self.open_session(user, now).await
    }

    async fn sign_out(&self, refresh_token: Option<String>) -> Result<(), AuthServiceError> {
        if let Some(refresh_token) = refresh_token {
            self.store.revoke_refresh_token(&refresh_token).await?;
        }

        Ok(())
    }

    async fn create_personal_token(
        &self,
        user_id: UserId,
        description: String,
        expires_at: Option<Timestamp>,
    ) -> Result<CreatedPersonalToken, AuthServiceError> {
        let uuid = Uuid::now_v7();
        let token = format_personal_token(
            uuid,
            PersonalTokenVersion::V1,
            &PersonalTokenSecret::generate(),
        );

        let record = self
            .store
            .create_access_token(NewAccessToken {
                uuid,
                user_id,
                description,
                token_hash: hash_personal_token(&token),
                created_at: Timestamp::now(),
                expires_at,
            })
            .await?;

        Ok(CreatedPersonalToken { token, record })
    }

    async fn list_personal_tokens(
        &self,
        user_id: UserId,
    ) -> Result<Vec<AccessTokenRecord>, AuthServiceError> {
        self.store
            .list_access_tokens(user_id)
            .await
            .map_err(AuthServiceError::from)
    }

    async fn delete_personal_token(
        &self,
        user_id: UserId,
        uuid: Uuid,
    ) -> Result<(), AuthServiceError> {
        let owned = self
            .store
            .find_access_token(uuid)
            .await?
            .is_some_and(|record| record.user_id == user_id);

        if !owned || !self.store.delete_access_token(uuid).await? {
            return Err(AuthServiceError::NotFound);
        }

        Ok(())
    }
}

#[automock]
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Resolve a bearer credential (stateless token or personal access token).
    async fn authenticate_bearer(&self, credential: &str) -> Result<Principal, AuthServiceError>;

    async fn sign_in(&self, username: &str, password: &str) -> Result<Session, AuthServiceError>;

    /// Open a session for an already-verified user.
    async fn issue_session(&self, user: &UserRecord) -> Result<Session, AuthServiceError>;

    /// Exchange a refresh token for a new session, consuming the old token.
    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthServiceError>;

    async fn sign_out(&self, refresh_token: Option<String>) -> Result<(), AuthServiceError>;

    async fn create_personal_token(
        &self,
        user_id: UserId,
        description: String,
        expires_at: Option<Timestamp>,
    ) -> Result<CreatedPersonalToken, AuthServiceError>;

    async fn list_personal_tokens(
        &self,
        user_id: UserId,
    ) -> Result<Vec<AccessTokenRecord>, AuthServiceError>;

    async fn delete_personal_token(
        &self,
        user_id: UserId,
        uuid: Uuid,
    ) -> Result<(), AuthServiceError>;
}
