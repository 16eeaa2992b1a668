//! Auth Config

use clap::Args;
use jiff::SignedDuration;
use portico_app::auth::AuthSettings;

/// Token lifetimes and account policy.
#[derive(Debug, Args)]
pub(crate) struct AuthConfig {
    /// Stateless access token lifetime in seconds
    #[arg(
        long,
        env = "ACCESS_TOKEN_TTL_SECS",
        default_value_t = 15 * 60,
        value_parser = clap::value_parser!(i64).range(1..)
    )]
    pub(crate) access_token_ttl_secs: i64,

    /// Refresh token lifetime in seconds
    #[arg(
        long,
        env = "REFRESH_TOKEN_TTL_SECS",
        default_value_t = 30 * 24 * 60 * 60,
        value_parser = clap::value_parser!(i64).range(1..)
    )]
    pub(crate) refresh_token_ttl_secs: i64,

    /// Issuer claim written into access tokens
    #[arg(long, env = "TOKEN_ISSUER", default_value = "portico")]
    pub(crate) token_issuer: String,

    /// Allow self-service sign-up once an administrator exists
    #[arg(long, env = "ALLOW_SIGNUP", default_value_t = false)]
    pub(crate) allow_signup: bool,

    /// Instance mode reported by the instance profile (prod, dev, demo)
    #[arg(long, env = "INSTANCE_MODE", default_value = "prod")]
    pub(crate) instance_mode: String,
}

impl AuthConfig {
    pub(crate) fn settings(&self) -> AuthSettings {
        AuthSettings {
            access_token_ttl: SignedDuration::from_secs(self.access_token_ttl_secs),
            refresh_token_ttl: SignedDuration::from_secs(self.refresh_token_ttl_secs),
            issuer: self.token_issuer.clone(),
        }
    }
}
