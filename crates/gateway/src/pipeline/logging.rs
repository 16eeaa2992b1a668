//! Per-call structured logging and metrics.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    observability::{metrics, settings},
    pipeline::{CallResult, Interceptor, Next},
    rpc::{Call, Code, methods},
};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Logging;

#[async_trait]
impl Interceptor for Logging {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult {
        let started = Instant::now();
        let _in_flight = metrics::InFlightCallGuard::track();

        let method = call.method.clone();
        let surface = call.surface;
        let request_id = call.metadata.request_id.clone();

        let span = info_span!(
            parent: None,
            "rpc.call",
            request_id = %request_id,
            method = %method,
            surface = %surface,
            client_ip = ?call.metadata.client_ip,
            code = tracing::field::Empty,
            duration_ms = tracing::field::Empty
        );

        let result = next.run(call).instrument(span.clone()).await;

        let code = result.as_ref().map_or_else(|status| status.code, |_| Code::Ok);
        let duration = started.elapsed();
        let duration_ms = duration.as_millis();
        let threshold_ms = u128::from(settings::slow_call_threshold_ms());

        metrics::observe_call(methods::label(&method), surface, code, duration);

        span.record("code", code.as_str());
        span.record("duration_ms", duration_ms);

        span.in_scope(|| {
            info!(code = %code, duration_ms, "call.completed");

            match &result {
                Err(status) if matches!(code, Code::Internal | Code::Unavailable) => {
                    error!(code = %code, message = %status.message, "server error response");
                }
                Err(status) => {
                    warn!(code = %code, message = %status.message, "client error response");
                }
                Ok(_) => {}
            }

            if duration_ms > threshold_ms {
                warn!(duration_ms, threshold_ms, "slow call detected");
            }
        });

        result
    }
}
