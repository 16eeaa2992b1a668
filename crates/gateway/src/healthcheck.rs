//! Portico Healthcheck Handler

use http::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::adapters::{GatewayBody, json_response};

/// Healthcheck response
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct HealthResponse {
    /// Service status
    pub(crate) status: String,
}

/// Liveness probe served at `/healthz` on the HTTP/1.1 and HTTP/2 loops.
pub(crate) fn handler() -> Response<GatewayBody> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "ok".to_string(),
        },
    )
}
