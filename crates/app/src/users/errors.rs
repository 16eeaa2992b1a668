//! Users service errors.

use thiserror::Error;

use crate::{auth::PasswordError, store::StoreError};

#[derive(Debug, Error)]
pub enum UsersServiceError {
    #[error("user not found")]
    NotFound,

    #[error("username is already taken")]
    AlreadyExists,

    #[error("invalid username: {0}")]
    InvalidUsername(&'static str),

    #[error("invalid password: {0}")]
    InvalidPassword(&'static str),

    #[error("update has no fields")]
    EmptyUpdate,

    #[error("sign-up is disabled on this instance")]
    SignupDisabled,

    #[error("password hashing error")]
    Password(#[from] PasswordError),

    #[error("storage error")]
    Store(#[source] StoreError),
}

impl From<StoreError> for UsersServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => Self::NotFound,
            StoreError::AlreadyExists => Self::AlreadyExists,
            other => Self::Store(other),
        }
    }
}
