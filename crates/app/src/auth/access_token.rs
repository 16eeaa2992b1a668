//! Short-lived stateless access tokens (HS256 JWT).
//!
//! Verification never touches storage: the signature, issuer and the
//! `[iat, exp)` window are all checked against the process secret and the
//! caller-supplied clock.

use std::fmt;

use jiff::Timestamp;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    auth::AuthConfig,
    store::records::{Role, UserId, UserRecord},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id, as a decimal string.
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl AccessClaims {
    /// # Errors
    ///
    /// Returns [`AccessTokenError::Malformed`] when `sub` is not a user id.
    pub fn user_id(&self) -> Result<UserId, AccessTokenError> {
        self.sub.parse().map_err(|_| AccessTokenError::Malformed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedAccessToken {
    pub token: String,
    pub expires_at: Timestamp,
}

#[derive(Debug, Error)]
pub enum AccessTokenError {
    #[error("access token is malformed")]
    Malformed,

    #[error("access token signature is invalid")]
    InvalidSignature,

    #[error("access token has expired")]
    Expired,

    #[error("access token is not yet valid")]
    NotYetValid,

    #[error("failed to sign access token")]
    Encode(#[source] jsonwebtoken::errors::Error),
}

pub struct AccessTokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    config: AuthConfig,
}

impl AccessTokenSigner {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.secret.as_bytes();

        // Expiry is checked by hand so the clock can be injected and leeway
        // stays at zero.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            config: config.clone(),
        }
    }

    /// Sign a token for `user`, valid from `now` for the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns [`AccessTokenError::Encode`] when signing fails.
    pub fn issue(
        &self,
        user: &UserRecord,
        now: Timestamp,
    ) -> Result<IssuedAccessToken, AccessTokenError> {
        let expires_at = now
            .checked_add(self.config.access_token_ttl)
            .map_err(|_| AccessTokenError::Malformed)?;

        let claims = AccessClaims {
            sub: user.id.to_string(),
            name: user.username.clone(),
            role: user.role,
            iat: now.as_second(),
            exp: expires_at.as_second(),
            iss: self.config.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AccessTokenError::Encode)?;

        Ok(IssuedAccessToken { token, expires_at })
    }

    /// Verify signature, issuer and `iat <= now < exp`.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the token was rejected.
    pub fn verify(&self, token: &str, now: Timestamp) -> Result<AccessClaims, AccessTokenError> {
        let claims = decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map_err(|error| match error.kind() {
                ErrorKind::InvalidSignature => AccessTokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => AccessTokenError::Expired,
                ErrorKind::ImmatureSignature => AccessTokenError::NotYetValid,
                _ => AccessTokenError::Malformed,
            })?
            .claims;

        let now = now.as_second();

        if now < claims.iat {
            return Err(AccessTokenError::NotYetValid);
        }

        if now >= claims.exp {
            return Err(AccessTokenError::Expired);
        }

        Ok(claims)
    }
}

impl fmt::Debug for AccessTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenSigner")
            .field("issuer", &self.config.issuer)
            .field("ttl", &self.config.access_token_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use testresult::TestResult;

    use crate::{
        auth::{AuthSettings, ProcessSecret},
        store::records::UserStatus,
    };

    use super::*;

    fn signer(secret: u8) -> AccessTokenSigner {
        AccessTokenSigner::new(&AuthConfig::new(
            ProcessSecret::from_bytes([secret; 32]),
            AuthSettings::default(),
        ))
    }

    fn user() -> UserRecord {
        UserRecord {
            id: 7,
            username: "alice".to_string(),
            nickname: String::new(),
            email: String::new(),
            role: Role::Admin,
            status: UserStatus::Active,
            password_hash: String::new(),
            created_at: Timestamp::UNIX_EPOCH,
            updated_at: Timestamp::UNIX_EPOCH,
        }
    }

    #[test]
    fn issued_token_verifies_within_its_window() -> TestResult {
        let signer = signer(1);
        let now = Timestamp::from_second(1_700_000_000)?;
        let issued = signer.issue(&user(), now)?;

        let claims = signer.verify(&issued.token, now + SignedDuration::from_mins(14))?;

        assert_eq!(claims.user_id()?, 7);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(issued.expires_at, now + SignedDuration::from_mins(15));

        Ok(())
    }

    #[test]
    fn expired_token_is_rejected_even_with_a_valid_signature() -> TestResult {
        let signer = signer(1);
        let now = Timestamp::from_second(1_700_000_000)?;
        let issued = signer.issue(&user(), now)?;

        for later in [15, 16, 60 * 24] {
            let result = signer.verify(&issued.token, now + SignedDuration::from_mins(later));

            assert!(
                matches!(result, Err(AccessTokenError::Expired)),
                "token should be expired after {later} minutes"
            );
        }

        Ok(())
    }

    #[test]
    fn token_from_before_issue_time_is_rejected() -> TestResult {
        let signer = signer(1);
        let now = Timestamp::from_second(1_700_000_000)?;
        let issued = signer.issue(&user(), now)?;

        let result = signer.verify(&issued.token, now - SignedDuration::from_secs(1));

        assert!(matches!(result, Err(AccessTokenError::NotYetValid)));

        Ok(())
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() -> TestResult {
        let now = Timestamp::from_second(1_700_000_000)?;
        let issued = signer(1).issue(&user(), now)?;

        let result = signer(2).verify(&issued.token, now);

        assert!(matches!(result, Err(AccessTokenError::InvalidSignature)));

        Ok(())
    }

    #[test]
    fn garbage_is_malformed() {
        let result = signer(1).verify("not-a-jwt", Timestamp::UNIX_EPOCH);

        assert!(matches!(result, Err(AccessTokenError::Malformed)));
    }
}
