//! Username and password rules.

use crate::users::UsersServiceError;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;

/// # Errors
///
/// Returns [`UsersServiceError::InvalidUsername`] describing the broken rule.
pub fn validate_username(username: &str) -> Result<(), UsersServiceError> {
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&username.len()) {
        return Err(UsersServiceError::InvalidUsername(
            "must be between 3 and 32 characters",
        ));
    }

    if !username.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(UsersServiceError::InvalidUsername(
            "must start with a letter or digit",
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(UsersServiceError::InvalidUsername(
            "may only contain letters, digits, `_`, `-` and `.`",
        ));
    }

    Ok(())
}

/// # Errors
///
/// Returns [`UsersServiceError::InvalidPassword`] describing the broken rule.
pub fn validate_password(password: &str) -> Result<(), UsersServiceError> {
    let length = password.chars().count();

    if length < PASSWORD_MIN {
        return Err(UsersServiceError::InvalidPassword(
            "must be at least 8 characters",
        ));
    }

    if length > PASSWORD_MAX {
        return Err(UsersServiceError::InvalidPassword(
            "must be at most 128 characters",
        ));
    }

    Ok(())
}
