//! Identity Cache Config

use std::time::Duration;

use clap::Args;
use portico_app::store::cache::CacheConfig as CacheSettings;

/// Identity cache settings.
#[derive(Debug, Args)]
pub(crate) struct CacheConfig {
    /// Seconds a cached user stays fresh
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 600)]
    pub(crate) cache_ttl_secs: u64,

    /// Maximum cached users
    #[arg(long, env = "CACHE_CAPACITY", default_value_t = 1_024)]
    pub(crate) cache_capacity: usize,

    /// Seconds between expired-entry sweeps
    #[arg(long, env = "CACHE_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub(crate) cache_sweep_interval_secs: u64,
}

impl CacheConfig {
    pub(crate) fn settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            capacity: self.cache_capacity,
            sweep_interval: Duration::from_secs(self.cache_sweep_interval_secs),
        }
    }
}
