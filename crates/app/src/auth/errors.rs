//! Auth service errors.

use thiserror::Error;

use crate::{
    auth::{AccessTokenError, PasswordError, PersonalTokenError},
    store::StoreError,
};

#[derive(Debug, Error)]
pub enum AuthServiceError {
    #[error("incorrect username or password")]
    InvalidCredentials,

    #[error("invalid access token")]
    InvalidAccessToken(#[source] AccessTokenError),

    #[error("invalid personal access token")]
    InvalidPersonalToken(#[source] Option<PersonalTokenError>),

    #[error("personal access token has expired")]
    ExpiredPersonalToken,

    #[error("user is not active")]
    InactiveUser,

    #[error("refresh token is missing, expired or revoked")]
    InvalidRefreshToken,

    #[error("refresh token was already used")]
    RefreshTokenReused,

    #[error("token not found")]
    NotFound,

    #[error("process secret is missing or corrupt")]
    InvalidSecret,

    #[error("failed to sign access token")]
    Signing(#[source] AccessTokenError),

    #[error("password hashing error")]
    Password(#[from] PasswordError),

    #[error("storage error")]
    Store(#[from] StoreError),
}

impl AuthServiceError {
    /// Failures that should surface as "unauthenticated" rather than an
    /// internal fault.
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::InvalidAccessToken(_)
                | Self::InvalidPersonalToken(_)
                | Self::ExpiredPersonalToken
                | Self::InactiveUser
                | Self::InvalidRefreshToken
                | Self::RefreshTokenReused
        )
    }
}
