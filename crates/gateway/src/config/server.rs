//! Server Config

use clap::Args;

/// Server runtime network settings.
#[derive(Debug, Args)]
pub(crate) struct ServerRuntimeConfig {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub(crate) host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8698")]
    pub(crate) port: u16,

    /// How long a new connection may take to identify its protocol
    #[arg(long, env = "SNIFF_TIMEOUT_MS", default_value_t = 5_000)]
    pub(crate) sniff_timeout_ms: u64,

    /// Maximum bytes inspected while identifying a connection's protocol
    #[arg(long, env = "SNIFF_PREFIX_LIMIT", default_value_t = 1_024)]
    pub(crate) sniff_prefix_limit: usize,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = 4 * 1024 * 1024)]
    pub(crate) max_body_bytes: usize,

    /// Deadline applied to calls that carry no `grpc-timeout` of their own
    #[arg(long, env = "DEFAULT_DEADLINE_MS")]
    pub(crate) default_deadline_ms: Option<u64>,

    /// Origins allowed to make credentialed browser calls (comma separated)
    #[arg(long, env = "CORS_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub(crate) cors_allowed_origins: Vec<String>,

    /// Grace period for open connections after a shutdown signal
    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value_t = 10)]
    pub(crate) drain_timeout_secs: u64,
}

impl ServerRuntimeConfig {
    /// Get the socket address for binding.
    #[must_use]
    pub(crate) fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
