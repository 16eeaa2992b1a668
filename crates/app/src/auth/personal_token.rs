//! Personal access token formatting, parsing and hash verification.
//!
//! Literal shape: `pat_v1_<uuid-simple>.<64 hex chars>`. Only the SHA-256
//! digest of the whole literal is persisted.

use std::{fmt, str::FromStr};

use hex::FromHex;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroize;

/// Personal access token prefix.
pub const PERSONAL_TOKEN_PREFIX: &str = "pat";

/// Number of secret bytes encoded in a token.
pub const PERSONAL_TOKEN_SECRET_BYTES: usize = 32;

const DIGEST_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonalTokenVersion {
    V1,
}

impl PersonalTokenVersion {
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::V1 => "v1",
        }
    }
}

impl FromStr for PersonalTokenVersion {
    type Err = PersonalTokenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "v1" => Ok(Self::V1),
            _ => Err(PersonalTokenError::UnsupportedVersion),
        }
    }
}

#[derive(Clone)]
pub struct PersonalTokenSecret {
    bytes: [u8; PERSONAL_TOKEN_SECRET_BYTES],
}

impl PersonalTokenSecret {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; PERSONAL_TOKEN_SECRET_BYTES]) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; PERSONAL_TOKEN_SECRET_BYTES];

        OsRng.fill_bytes(&mut bytes);

        Self { bytes }
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PERSONAL_TOKEN_SECRET_BYTES] {
        &self.bytes
    }
}

impl fmt::Debug for PersonalTokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PersonalTokenSecret(**redacted**)")
    }
}

impl Drop for PersonalTokenSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

#[derive(Debug, Clone)]
pub struct ParsedPersonalToken {
    pub uuid: Uuid,
    pub version: PersonalTokenVersion,
    pub secret: PersonalTokenSecret,
}

#[derive(Debug, Error, PartialEq)]
pub enum PersonalTokenError {
    #[error("personal access token format is invalid")]
    InvalidFormat,

    #[error("personal access token uses an unsupported version")]
    UnsupportedVersion,

    #[error("personal access token secret encoding is invalid")]
    InvalidSecretEncoding(#[source] hex::FromHexError),
}

/// Cheap shape check used to route a bearer credential.
#[must_use]
pub fn looks_like_personal_token(credential: &str) -> bool {
    credential
        .strip_prefix(PERSONAL_TOKEN_PREFIX)
        .is_some_and(|rest| rest.starts_with('_'))
}

#[must_use]
pub fn format_personal_token(
    uuid: Uuid,
    version: PersonalTokenVersion,
    secret: &PersonalTokenSecret,
) -> String {
    format!(
        "{PERSONAL_TOKEN_PREFIX}_{}_{}.{}",
        version.segment(),
        uuid.simple(),
        hex::encode(secret.as_bytes())
    )
}

/// # Errors
///
/// Returns an error when `token` does not have the personal token shape.
pub fn parse_personal_token(token: &str) -> Result<ParsedPersonalToken, PersonalTokenError> {
    let (prefix_and_id, secret_hex) = token
        .split_once('.')
        .ok_or(PersonalTokenError::InvalidFormat)?;

    let mut id_parts = prefix_and_id.splitn(3, '_');

    let prefix = id_parts.next().ok_or(PersonalTokenError::InvalidFormat)?;
    let version_segment = id_parts.next().ok_or(PersonalTokenError::InvalidFormat)?;
    let uuid_segment = id_parts.next().ok_or(PersonalTokenError::InvalidFormat)?;

    if prefix != PERSONAL_TOKEN_PREFIX {
        return Err(PersonalTokenError::InvalidFormat);
    }

    let version = PersonalTokenVersion::from_str(version_segment)?;

    let uuid = Uuid::try_parse(uuid_segment).map_err(|_| PersonalTokenError::InvalidFormat)?;

    let secret = <[u8; PERSONAL_TOKEN_SECRET_BYTES]>::from_hex(secret_hex)
        .map_err(PersonalTokenError::InvalidSecretEncoding)?;

    Ok(ParsedPersonalToken {
        uuid,
        version,
        secret: PersonalTokenSecret::from_bytes(secret),
    })
}

/// SHA-256 of the full token literal, hex encoded.
#[must_use]
pub fn hash_personal_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Compare `token` against a stored digest in constant time.
#[must_use]
pub fn verify_personal_token_hash(token: &str, stored_hash: &str) -> bool {
    let Ok(stored) = <[u8; DIGEST_BYTES]>::from_hex(stored_hash) else {
        return false;
    };

    let presented = Sha256::digest(token.as_bytes());

    presented.as_slice().ct_eq(&stored).into()
}
