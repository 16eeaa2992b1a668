//! Password hashing.
//!
//! Argon2 is deliberately slow, so both operations run on tokio's blocking
//! pool instead of a runtime worker.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;
use thiserror::Error;
use tokio::task;

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

impl From<task::JoinError> for PasswordError {
    fn from(error: task::JoinError) -> Self {
        Self(error.to_string())
    }
}

/// Hash `password` into an argon2 PHC string.
///
/// # Errors
///
/// Returns an error when the hasher rejects its parameters or the blocking
/// task is cancelled.
pub async fn hash_password(password: &str) -> Result<String, PasswordError> {
    let password = password.to_owned();

    task::spawn_blocking(move || hash(&password)).await?
}

/// Check `password` against a stored PHC string. Unparseable hashes never
/// verify.
///
/// # Errors
///
/// Returns an error only when the blocking task is cancelled.
pub async fn verify_password(password: &str, password_hash: &str) -> Result<bool, PasswordError> {
    let password = password.to_owned();
    let password_hash = password_hash.to_owned();

    Ok(task::spawn_blocking(move || verify(&password, &password_hash)).await?)
}

fn hash(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| PasswordError(error.to_string()))
}

fn verify(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
