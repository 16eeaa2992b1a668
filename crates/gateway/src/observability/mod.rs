//! Logging setup and call metrics.

use thiserror::Error;

mod logging;
pub(crate) mod metrics;
pub(crate) mod settings;

pub(crate) use logging::init;

/// Errors raised while initialising observability.
#[derive(Debug, Error)]
pub(crate) enum ObservabilityError {
    /// Failed to initialise tracing subscriber.
    #[error("failed to initialise tracing subscriber: {0}")]
    TracingSubscriber(#[from] tracing_subscriber::util::TryInitError),
}
