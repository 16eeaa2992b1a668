//! Surface adapters: translate each wire protocol into pipeline calls.

use std::{convert::Infallible, time::Instant};

use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, header};
use http_body_util::{BodyExt, Empty, Full, combinators::BoxBody};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::{
    observability::metrics,
    rpc::{Status, Surface, methods},
};

pub(crate) mod framing;
mod native;
mod rest;
mod server;
mod web;

pub(crate) use server::HttpGateway;
pub(crate) use web::CorsPolicy;

/// Response body type shared by every surface.
pub(crate) type GatewayBody = BoxBody<Bytes, Infallible>;

pub(crate) fn full(bytes: impl Into<Bytes>) -> GatewayBody {
    Full::new(bytes.into()).boxed()
}

pub(crate) fn empty() -> GatewayBody {
    Empty::new().boxed()
}

pub(crate) fn json_response(status: StatusCode, value: &impl Serialize) -> Response<GatewayBody> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(full(body));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(serialize_error) => {
            error!("failed to serialize response body: {serialize_error}");

            let mut response = Response::new(empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

/// Decode a JSON request message. An empty message is `null`.
pub(crate) fn parse_message(message: &[u8]) -> Result<Value, Status> {
    if message.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_slice(message)
        .map_err(|parse_error| Status::invalid_argument(format!("invalid JSON message: {parse_error}")))
}

/// Account for a request rejected before it could enter the pipeline.
pub(crate) fn reject(method: &str, surface: Surface, started: Instant, status: &Status) {
    debug!(
        method,
        surface = surface.as_str(),
        code = status.code.as_str(),
        "malformed request: {}",
        status.message
    );

    metrics::observe_call(methods::label(method), surface, status.code, started.elapsed());
}
