//! Native RPC over HTTP/2: length-prefixed JSON messages, status in trailers.

use std::{convert::Infallible, net::SocketAddr, time::Instant};

use bytes::Bytes;
use futures_util::stream;
use http::{HeaderMap, HeaderValue, Response, header, request::Parts};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use tracing::error;

use crate::{
    adapters::{
        GatewayBody,
        framing::{self, FrameError},
        parse_message, reject,
    },
    pipeline::{CallResult, Pipeline},
    rpc::{Call, Status, Surface},
};

pub(crate) const CONTENT_TYPE: &str = "application/grpc+json";

pub(crate) fn accepts(content_type: &str) -> bool {
    content_type.starts_with("application/grpc") && !content_type.starts_with("application/grpc-web")
}

pub(crate) async fn handle(
    pipeline: &Pipeline,
    parts: Parts,
    body: Bytes,
    peer: SocketAddr,
) -> Response<GatewayBody> {
    let started = Instant::now();
    let method = parts.uri.path().to_string();

    let payload = framing::decode_request(body)
        .map_err(Status::from)
        .and_then(|message| parse_message(&message));

    let result = match payload {
        Ok(payload) => {
            pipeline
                .call(Call::new(method, Surface::Native, peer, parts.headers, payload))
                .await
        }
        Err(status) => {
            reject(&method, Surface::Native, started, &status);
            Err(status)
        }
    };

    respond(result)
}

/// Always HTTP 200; the outcome travels in the `grpc-status` trailer.
pub(crate) fn respond(result: CallResult) -> Response<GatewayBody> {
    let mut frames: Vec<Result<Frame<Bytes>, Infallible>> = Vec::with_capacity(2);

    let status = match result.and_then(|reply| encode_reply(&reply.payload)) {
        Ok(message) => {
            frames.push(Ok(Frame::data(message)));
            None
        }
        Err(status) => Some(status),
    };

    frames.push(Ok(Frame::trailers(status_trailers(status.as_ref()))));

    let mut response = Response::new(StreamBody::new(stream::iter(frames)).boxed());
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    response
}

fn encode_reply(payload: &serde_json::Value) -> Result<Bytes, Status> {
    let message = serde_json::to_vec(payload).map_err(|serialize_error| {
        error!("failed to serialize reply: {serialize_error}");
        Status::internal()
    })?;

    framing::encode(0, &message).map_err(|frame_error: FrameError| {
        error!("failed to frame reply: {frame_error}");
        Status::internal()
    })
}

fn status_trailers(status: Option<&Status>) -> HeaderMap {
    let (code, message) = framing::status_parts(status);
    let mut trailers = HeaderMap::with_capacity(2);

    trailers.insert("grpc-status", HeaderValue::from(code.grpc()));

    if let Ok(message) = HeaderValue::from_str(&message) {
        trailers.insert("grpc-message", message);
    }

    trailers
}

#[cfg(test)]
mod tests {
    use http::Request;
    use serde_json::{Value, json};
    use testresult::TestResult;

    use super::*;
    use crate::{
        pipeline::{PipelineBuilder, testing::Echo},
        rpc::{Reply, methods},
    };

    async fn collect(response: Response<GatewayBody>) -> TestResult<(Bytes, HeaderMap)> {
        let collected = response.into_body().collect().await?;
        let trailers = collected.trailers().cloned().unwrap_or_default();

        Ok((collected.to_bytes(), trailers))
    }

    fn request(method: &str, body: Bytes) -> TestResult<(Parts, Bytes)> {
        let (parts, ()) = Request::post(method)
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .body(())?
            .into_parts();

        Ok((parts, body))
    }

    #[test]
    fn content_types_separate_native_from_browser_rpc() {
        assert!(accepts("application/grpc"));
        assert!(accepts("application/grpc+json"));
        assert!(!accepts("application/grpc-web+json"));
        assert!(!accepts("application/json"));
    }

    #[tokio::test]
    async fn replies_are_framed_with_ok_trailers() -> TestResult {
        let (body, trailers) = collect(respond(Ok(Reply::new(json!({"id": 1}))))).await?;
        let message = framing::decode_request(body)?;

        assert_eq!(serde_json::from_slice::<Value>(&message)?, json!({"id": 1}));
        assert_eq!(
            trailers.get("grpc-status").map(HeaderValue::as_bytes),
            Some(b"0".as_slice())
        );

        Ok(())
    }

    #[tokio::test]
    async fn failures_have_no_message_and_a_status_trailer() -> TestResult {
        let response = respond(Err(Status::permission_denied("admin only")));

        assert_eq!(response.status(), http::StatusCode::OK);

        let (body, trailers) = collect(response).await?;

        assert!(body.is_empty(), "no message frame");
        assert_eq!(
            trailers.get("grpc-status").map(HeaderValue::as_bytes),
            Some(b"7".as_slice())
        );
        assert_eq!(
            trailers.get("grpc-message").map(HeaderValue::as_bytes),
            Some(b"admin only".as_slice())
        );

        Ok(())
    }

    #[tokio::test]
    async fn calls_flow_through_the_pipeline() -> TestResult {
        let echo = Echo::shared();
        let pipeline = PipelineBuilder::new().build(echo.clone());
        let (parts, body) = request(methods::GET_INSTANCE_PROFILE, framing::encode(0, b"{}")?)?;

        let response = handle(&pipeline, parts, body, "10.1.1.1:1000".parse()?).await;
        let (body, _) = collect(response).await?;
        let reply: Value = serde_json::from_slice(&framing::decode_request(body)?)?;

        assert_eq!(echo.count(), 1);
        assert_eq!(
            reply.get("method"),
            Some(&json!(methods::GET_INSTANCE_PROFILE))
        );

        Ok(())
    }

    #[tokio::test]
    async fn malformed_frames_never_reach_the_handler() -> TestResult {
        let echo = Echo::shared();
        let pipeline = PipelineBuilder::new().build(echo.clone());
        let (parts, body) = request(methods::SIGN_IN, Bytes::from_static(b"\x00\x00"))?;

        let response = handle(&pipeline, parts, body, "10.1.1.1:1000".parse()?).await;
        let (_, trailers) = collect(response).await?;

        assert_eq!(echo.count(), 0);
        assert_eq!(
            trailers.get("grpc-status").map(HeaderValue::as_bytes),
            Some(b"3".as_slice())
        );

        Ok(())
    }
}
