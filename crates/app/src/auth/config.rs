//! Immutable authentication settings shared by every component.

use std::fmt;

use hex::FromHex;
use jiff::SignedDuration;
use rand::{RngCore, rngs::OsRng};
use zeroize::Zeroize;

/// Number of random bytes in the process secret.
pub const PROCESS_SECRET_BYTES: usize = 32;

/// HMAC key for stateless tokens, generated once per instance.
#[derive(Clone)]
pub struct ProcessSecret {
    bytes: [u8; PROCESS_SECRET_BYTES],
}

impl ProcessSecret {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; PROCESS_SECRET_BYTES]) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; PROCESS_SECRET_BYTES];

        OsRng.fill_bytes(&mut bytes);

        Self { bytes }
    }

    #[must_use]
    pub fn from_hex(value: &str) -> Option<Self> {
        <[u8; PROCESS_SECRET_BYTES]>::from_hex(value)
            .ok()
            .map(Self::from_bytes)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PROCESS_SECRET_BYTES] {
        &self.bytes
    }
}

impl fmt::Debug for ProcessSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProcessSecret(**redacted**)")
    }
}

impl Drop for ProcessSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Token lifetimes, before the secret is known.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_token_ttl: SignedDuration,
    pub refresh_token_ttl: SignedDuration,
    pub issuer: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_token_ttl: SignedDuration::from_mins(15),
            refresh_token_ttl: SignedDuration::from_hours(24 * 30),
            issuer: "portico".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret: ProcessSecret,
    pub access_token_ttl: SignedDuration,
    pub refresh_token_ttl: SignedDuration,
    pub issuer: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(secret: ProcessSecret, settings: AuthSettings) -> Self {
        Self {
            secret,
            access_token_ttl: settings.access_token_ttl,
            refresh_token_ttl: settings.refresh_token_ttl,
            issuer: settings.issuer,
        }
    }
}
