//! Prometheus call and connection metrics.

use std::{sync::OnceLock, time::Duration};

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::error;

use crate::rpc::{Code, Surface};

#[derive(Debug)]
struct CallMetrics {
    registry: Registry,
    calls_total: IntCounterVec,
    call_duration_seconds: HistogramVec,
    calls_in_flight: IntGauge,
    connections_total: IntCounterVec,
}

static CALL_METRICS: OnceLock<Option<CallMetrics>> = OnceLock::new();

/// Encoded exposition body and its content type.
#[derive(Debug)]
pub(crate) struct Exposition {
    pub(crate) content_type: String,
    pub(crate) body: Vec<u8>,
}

#[derive(Debug)]
pub(crate) struct InFlightCallGuard {
    tracked: bool,
}

impl InFlightCallGuard {
    pub(crate) fn track() -> Self {
        if let Some(metrics) = metrics() {
            metrics.calls_in_flight.inc();
            return Self { tracked: true };
        }

        Self { tracked: false }
    }
}

impl Drop for InFlightCallGuard {
    fn drop(&mut self) {
        if self.tracked
            && let Some(metrics) = metrics()
        {
            metrics.calls_in_flight.dec();
        }
    }
}

pub(crate) fn observe_call(method: &str, surface: Surface, code: Code, duration: Duration) {
    let Some(metrics) = metrics() else {
        return;
    };

    metrics
        .calls_total
        .with_label_values(&[method, surface.as_str(), code.as_str()])
        .inc();

    metrics
        .call_duration_seconds
        .with_label_values(&[method, surface.as_str()])
        .observe(duration.as_secs_f64());
}

pub(crate) fn observe_connection(protocol: &str) {
    if let Some(metrics) = metrics() {
        metrics.connections_total.with_label_values(&[protocol]).inc();
    }
}

/// Render every registered metric in the text exposition format.
pub(crate) fn render() -> Option<Exposition> {
    let metrics = metrics()?;

    let encoder = TextEncoder::new();
    let mut body = Vec::new();

    if let Err(source) = encoder.encode(&metrics.registry.gather(), &mut body) {
        error!("failed to encode metrics response: {source}");
        return None;
    }

    Some(Exposition {
        content_type: encoder.format_type().to_string(),
        body,
    })
}

fn metrics() -> Option<&'static CallMetrics> {
    CALL_METRICS.get_or_init(build_metrics).as_ref()
}

fn build_metrics() -> Option<CallMetrics> {
    let registry = Registry::new();

    let calls_total = match IntCounterVec::new(
        Opts::new(
            "portico_rpc_calls_total",
            "Total calls partitioned by method, surface, and outcome code.",
        ),
        &["method", "surface", "code"],
    ) {
        Ok(metric) => metric,
        Err(source) => {
            error!("failed to create calls_total metric: {source}");
            return None;
        }
    };

    let call_duration_seconds = match HistogramVec::new(
        HistogramOpts::new(
            "portico_rpc_call_duration_seconds",
            "Call duration in seconds partitioned by method and surface.",
        )
        .buckets(vec![
            0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "surface"],
    ) {
        Ok(metric) => metric,
        Err(source) => {
            error!("failed to create call_duration metric: {source}");
            return None;
        }
    };

    let calls_in_flight = match IntGauge::with_opts(Opts::new(
        "portico_rpc_calls_in_flight",
        "Current number of in-flight calls.",
    )) {
        Ok(metric) => metric,
        Err(source) => {
            error!("failed to create in-flight gauge metric: {source}");
            return None;
        }
    };

    let connections_total = match IntCounterVec::new(
        Opts::new(
            "portico_connections_total",
            "Accepted connections partitioned by detected protocol.",
        ),
        &["protocol"],
    ) {
        Ok(metric) => metric,
        Err(source) => {
            error!("failed to create connections_total metric: {source}");
            return None;
        }
    };

    if let Err(source) = registry.register(Box::new(calls_total.clone())) {
        error!("failed to register calls_total metric: {source}");
        return None;
    }

    if let Err(source) = registry.register(Box::new(call_duration_seconds.clone())) {
        error!("failed to register call_duration metric: {source}");
        return None;
    }

    if let Err(source) = registry.register(Box::new(calls_in_flight.clone())) {
        error!("failed to register in-flight gauge metric: {source}");
        return None;
    }

    if let Err(source) = registry.register(Box::new(connections_total.clone())) {
        error!("failed to register connections_total metric: {source}");
        return None;
    }

    Some(CallMetrics {
        registry,
        calls_total,
        call_duration_seconds,
        calls_in_flight,
        connections_total,
    })
}
