//! Process-global observability runtime settings.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::GatewayConfig;

const DEFAULT_SLOW_CALL_THRESHOLD_MS: u64 = 1_000;

static SLOW_CALL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(DEFAULT_SLOW_CALL_THRESHOLD_MS);

pub(super) fn apply_runtime_config(config: &GatewayConfig) {
    SLOW_CALL_THRESHOLD_MS.store(config.logging.slow_call_threshold_ms, Ordering::Relaxed);
}

pub(crate) fn slow_call_threshold_ms() -> u64 {
    SLOW_CALL_THRESHOLD_MS.load(Ordering::Relaxed)
}
