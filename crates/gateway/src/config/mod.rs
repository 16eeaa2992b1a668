//! Gateway configuration module

use std::time::Duration;

use clap::Parser;
use portico_app::{context::AppSettings, instance::InstanceSettings};

use crate::{
    adapters::CorsPolicy,
    config::{
        auth::AuthConfig, cache::CacheConfig, db::DatabaseConfig, observability::LoggingConfig,
        server::ServerRuntimeConfig,
    },
    router::RouterConfig,
};

pub(crate) mod auth;
pub(crate) mod cache;
pub(crate) mod db;
pub(crate) mod observability;
pub(crate) mod server;

pub(crate) use observability::LogFormat;

/// Portico gateway configuration
#[derive(Debug, Parser)]
#[command(name = "portico", about = "Portico single-port RPC and REST gateway", long_about = None)]
pub(crate) struct GatewayConfig {
    /// Listener and request limits.
    #[command(flatten)]
    pub(crate) server: ServerRuntimeConfig,

    /// Logging output settings.
    #[command(flatten)]
    pub(crate) logging: LoggingConfig,

    /// Application database settings.
    #[command(flatten)]
    pub(crate) database: DatabaseConfig,

    /// Token lifetimes and sign-up policy.
    #[command(flatten)]
    pub(crate) auth: AuthConfig,

    /// Identity cache settings.
    #[command(flatten)]
    pub(crate) cache: CacheConfig,
}

impl GatewayConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub(crate) fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    /// Get the socket address for binding
    #[must_use]
    pub(crate) fn socket_addr(&self) -> String {
        self.server.socket_addr()
    }

    pub(crate) fn app_settings(&self) -> AppSettings {
        AppSettings {
            database: self.database.settings(),
            cache: self.cache.settings(),
            auth: self.auth.settings(),
            instance: InstanceSettings {
                mode: self.auth.instance_mode.clone(),
                allow_signup: self.auth.allow_signup,
                ..InstanceSettings::default()
            },
        }
    }

    pub(crate) fn default_deadline(&self) -> Option<Duration> {
        self.server.default_deadline_ms.map(Duration::from_millis)
    }

    pub(crate) fn cors_policy(&self) -> CorsPolicy {
        CorsPolicy::new(&self.server.cors_allowed_origins)
    }

    pub(crate) fn router_config(&self) -> RouterConfig {
        RouterConfig {
            sniff_timeout: Duration::from_millis(self.server.sniff_timeout_ms),
            prefix_limit: self.server.sniff_prefix_limit,
            drain_timeout: Duration::from_secs(self.server.drain_timeout_secs),
        }
    }
}
