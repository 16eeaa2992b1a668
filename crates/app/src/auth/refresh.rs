//! Refresh token identifiers.

use rand::{RngCore, rngs::OsRng};

/// Cookie carrying the refresh token id.
pub const REFRESH_COOKIE: &str = "portico_refresh";

const REFRESH_TOKEN_BYTES: usize = 32;

/// Opaque random refresh token id.
#[must_use]
pub fn generate_refresh_token_id() -> String {
    let mut bytes = [0_u8; REFRESH_TOKEN_BYTES];

    OsRng.fill_bytes(&mut bytes);

    hex::encode(bytes)
}
