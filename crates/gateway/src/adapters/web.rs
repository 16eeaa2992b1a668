//! Browser RPC (gRPC-web) over HTTP/1.1.
//!
//! Binary and base64 text encodings of the same framing. The call status
//! rides in a trailing `0x80` frame inside the body, since browsers cannot
//! read HTTP trailers.

use std::{net::SocketAddr, time::Instant};

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::{Bytes, BytesMut};
use http::{
    HeaderMap, HeaderValue, Method, Response, StatusCode, header, request::Parts,
};
use tracing::{error, warn};

use crate::{
    adapters::{GatewayBody, empty, framing, full, parse_message, reject},
    pipeline::{CallResult, Pipeline},
    rpc::{Call, Status, Surface},
};

const CONTENT_TYPE_PREFIX: &str = "application/grpc-web";
const TEXT_CONTENT_TYPE_PREFIX: &str = "application/grpc-web-text";

const ALLOW_HEADERS: &str =
    "authorization, content-type, grpc-timeout, x-grpc-web, x-user-agent, x-request-id";
const EXPOSE_HEADERS: &str = "grpc-status, grpc-message, x-request-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    Binary,
    Text,
}

impl Encoding {
    pub(crate) fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with(TEXT_CONTENT_TYPE_PREFIX) {
            Self::Text
        } else {
            Self::Binary
        }
    }

    const fn response_content_type(self) -> &'static str {
        match self {
            Self::Binary => "application/grpc-web+json",
            Self::Text => "application/grpc-web-text+json",
        }
    }

    fn decode(self, body: Bytes) -> Result<Bytes, Status> {
        match self {
            Self::Binary => Ok(body),
            Self::Text => STANDARD
                .decode(body.trim_ascii())
                .map(Bytes::from)
                .map_err(|decode_error| {
                    Status::invalid_argument(format!("invalid base64 body: {decode_error}"))
                }),
        }
    }

    fn encode(self, body: Bytes) -> Bytes {
        match self {
            Self::Binary => body,
            Self::Text => Bytes::from(STANDARD.encode(body)),
        }
    }
}

/// Origins allowed to make credentialed browser calls. Empty means no
/// cross-origin access.
#[derive(Debug, Clone, Default)]
pub(crate) struct CorsPolicy {
    allowed: Vec<HeaderValue>,
}

impl CorsPolicy {
    /// Entries are compared byte for byte with the request's `Origin`; a
    /// trailing slash is ignored. Entries that are not valid header values
    /// are skipped.
    pub(crate) fn new<I, O>(origins: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: AsRef<str>,
    {
        let allowed = origins
            .into_iter()
            .filter_map(|origin| {
                let origin = origin.as_ref().trim().trim_end_matches('/');

                if origin.is_empty() {
                    return None;
                }

                HeaderValue::from_str(origin)
                    .inspect_err(|invalid| warn!(origin, "ignoring CORS origin: {invalid}"))
                    .ok()
            })
            .collect();

        Self { allowed }
    }

    /// The request's origin when it is on the allow-list.
    pub(crate) fn allowed_origin(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        let origin = headers.get(header::ORIGIN)?;

        self.allowed
            .iter()
            .any(|allowed| allowed == origin)
            .then(|| origin.clone())
    }
}

pub(crate) fn accepts(content_type: &str) -> bool {
    content_type.starts_with(CONTENT_TYPE_PREFIX)
}

/// CORS preflight for a browser RPC call.
pub(crate) fn is_preflight(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

pub(crate) fn preflight(origin: Option<&HeaderValue>) -> Response<GatewayBody> {
    let mut response = Response::new(empty());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let out = response.headers_mut();
    cors(out, origin);
    out.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    out.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    out.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );

    response
}

pub(crate) async fn handle(
    pipeline: &Pipeline,
    parts: Parts,
    body: Bytes,
    peer: SocketAddr,
    encoding: Encoding,
    origin: Option<HeaderValue>,
) -> Response<GatewayBody> {
    let started = Instant::now();
    let method = parts.uri.path().to_string();

    let payload = encoding
        .decode(body)
        .and_then(|raw| framing::decode_request(raw).map_err(Status::from))
        .and_then(|message| parse_message(&message));

    let result = match payload {
        Ok(payload) => {
            pipeline
                .call(Call::new(method, Surface::Web, peer, parts.headers, payload))
                .await
        }
        Err(status) => {
            reject(&method, Surface::Web, started, &status);
            Err(status)
        }
    };

    respond(result, encoding, origin.as_ref())
}

pub(crate) fn respond(
    result: CallResult,
    encoding: Encoding,
    origin: Option<&HeaderValue>,
) -> Response<GatewayBody> {
    let mut out = BytesMut::new();
    let mut cookies = Vec::new();

    let outcome = result.and_then(|reply| {
        let message = serde_json::to_vec(&reply.payload).map_err(|serialize_error| {
            error!("failed to serialize reply: {serialize_error}");
            Status::internal()
        })?;

        framing::encode_into(&mut out, 0, &message).map_err(|frame_error| {
            error!("failed to frame reply: {frame_error}");
            Status::internal()
        })?;

        cookies = reply.cookies;

        Ok(())
    });

    let status = outcome.err();
    let trailers = framing::trailer_block(status.as_ref());

    if let Err(frame_error) =
        framing::encode_into(&mut out, framing::FLAG_TRAILERS, trailers.as_bytes())
    {
        error!("failed to frame trailers: {frame_error}");
    }

    let mut response = Response::new(full(encoding.encode(out.freeze())));
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(encoding.response_content_type()),
    );
    cors(headers, origin);

    for cookie in cookies {
        match HeaderValue::from_str(&cookie.header_value()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(invalid) => error!(cookie = cookie.name, "invalid cookie value: {invalid}"),
        }
    }

    response
}

/// Credentialed CORS for an allow-listed `origin`. Without one the response
/// carries no `Access-Control-Allow-Origin` and browsers withhold it from
/// cross-origin scripts.
fn cors(headers: &mut HeaderMap, origin: Option<&HeaderValue>) {
    if let Some(origin) = origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }

    headers.insert(header::VARY, HeaderValue::from_static("origin"));
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSE_HEADERS),
    );
}

#[cfg(test)]
mod tests {
    use http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use testresult::TestResult;

    use super::*;
    use crate::{
        adapters::framing::Frame,
        pipeline::{PipelineBuilder, testing::Echo},
        rpc::{Reply, SetCookie, methods},
    };

    async fn frames(response: Response<GatewayBody>, encoding: Encoding) -> TestResult<Vec<Frame>> {
        let body = response.into_body().collect().await?.to_bytes();
        let raw = match encoding {
            Encoding::Binary => body,
            Encoding::Text => Bytes::from(STANDARD.decode(&body)?),
        };

        Ok(framing::decode(raw)?)
    }

    fn parts(origin: Option<&'static str>) -> TestResult<Parts> {
        let mut builder = Request::post(methods::GET_INSTANCE_PROFILE)
            .header(header::CONTENT_TYPE, "application/grpc-web+json");

        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }

        Ok(builder.body(())?.into_parts().0)
    }

    #[test]
    fn encoding_follows_the_content_type() {
        assert_eq!(
            Encoding::from_content_type("application/grpc-web-text+json"),
            Encoding::Text
        );
        assert_eq!(
            Encoding::from_content_type("application/grpc-web+json"),
            Encoding::Binary
        );
        assert!(accepts("application/grpc-web"));
        assert!(!accepts("application/grpc"));
    }

    #[tokio::test]
    async fn reply_is_followed_by_a_trailer_frame() -> TestResult {
        let response = respond(
            Ok(Reply::new(json!({"ok": true}))),
            Encoding::Binary,
            None,
        );

        assert_eq!(response.status(), StatusCode::OK);

        let frames = frames(response, Encoding::Binary).await?;
        let [message, trailers] = frames.as_slice() else {
            return Err("expected a message and a trailer frame".into());
        };

        assert!(!message.is_trailers());
        assert_eq!(
            serde_json::from_slice::<Value>(&message.payload)?,
            json!({"ok": true})
        );
        assert!(trailers.is_trailers());
        assert_eq!(
            trailers.payload.as_ref(),
            b"grpc-status:0\r\ngrpc-message:\r\n"
        );

        Ok(())
    }

    #[tokio::test]
    async fn text_encoding_is_base64_of_the_binary_frames() -> TestResult {
        let response = respond(Err(Status::unauthenticated("missing credential")), Encoding::Text, None);

        assert_eq!(
            response.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/grpc-web-text+json"))
        );

        let frames = frames(response, Encoding::Text).await?;

        assert_eq!(frames.len(), 1, "only the trailer frame");
        assert!(frames.first().is_some_and(|frame| {
            frame.payload.as_ref() == b"grpc-status:16\r\ngrpc-message:missing credential\r\n"
        }));

        Ok(())
    }

    #[tokio::test]
    async fn session_cookies_become_set_cookie_headers() -> TestResult {
        let reply = Reply::empty().with_cookie(SetCookie::new("portico_refresh", "abc", 60));
        let origin = HeaderValue::from_static("https://app.example");

        let response = respond(Ok(reply), Encoding::Binary, Some(&origin));
        let headers = response.headers();

        assert_eq!(
            headers.get(header::SET_COOKIE).map(HeaderValue::as_bytes),
            Some(
                b"portico_refresh=abc; Path=/; Max-Age=60; HttpOnly; SameSite=Strict".as_slice()
            )
        );
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN), Some(&origin));
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS),
            Some(&HeaderValue::from_static("true"))
        );

        Ok(())
    }

    #[test]
    fn preflight_answers_with_allowed_headers() -> TestResult {
        let (parts, ()) = Request::options(methods::SIGN_IN)
            .header(header::ORIGIN, "https://app.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(())?
            .into_parts();

        assert!(is_preflight(&parts.method, &parts.headers));

        let origin = HeaderValue::from_static("https://app.example");
        let response = preflight(Some(&origin));

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&origin)
        );
        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
                .is_some_and(|value| value.as_bytes().starts_with(b"authorization")),
            "authorization may be sent"
        );

        Ok(())
    }

    #[tokio::test]
    async fn text_requests_are_decoded_before_dispatch() -> TestResult {
        let echo = Echo::shared();
        let pipeline = PipelineBuilder::new().build(echo.clone());
        let body = Bytes::from(STANDARD.encode(framing::encode(0, b"{}")?));

        let response = handle(
            &pipeline,
            parts(Some("https://app.example"))?,
            body,
            "192.0.2.1:5000".parse()?,
            Encoding::Text,
            Some(HeaderValue::from_static("https://app.example")),
        )
        .await;
        let frames = frames(response, Encoding::Text).await?;

        assert_eq!(echo.count(), 1);
        assert_eq!(frames.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn invalid_base64_is_invalid_argument() -> TestResult {
        let echo = Echo::shared();
        let pipeline = PipelineBuilder::new().build(echo.clone());

        let response = handle(
            &pipeline,
            parts(None)?,
            Bytes::from_static(b"***"),
            "192.0.2.1:5000".parse()?,
            Encoding::Text,
            None,
        )
        .await;
        let frames = frames(response, Encoding::Text).await?;

        assert_eq!(echo.count(), 0);
        assert!(frames.first().is_some_and(|frame| {
            frame.payload.starts_with(b"grpc-status:3\r\n")
        }));

        Ok(())
    }

    #[test]
    fn only_listed_origins_are_granted() -> TestResult {
        let policy = CorsPolicy::new(["https://app.example/", " https://admin.example", ""]);
        let request = |origin: &'static str| -> TestResult<HeaderMap> {
            Ok(Request::post("/")
                .header(header::ORIGIN, origin)
                .body(())?
                .into_parts()
                .0
                .headers)
        };

        assert_eq!(
            policy.allowed_origin(&request("https://app.example")?),
            Some(HeaderValue::from_static("https://app.example"))
        );
        assert!(policy.allowed_origin(&request("https://admin.example")?).is_some());
        assert_eq!(policy.allowed_origin(&request("https://evil.example")?), None);
        assert_eq!(policy.allowed_origin(&HeaderMap::new()), None);
        assert_eq!(
            CorsPolicy::default().allowed_origin(&request("https://app.example")?),
            None
        );

        Ok(())
    }

    #[test]
    fn unlisted_origin_gets_no_credentialed_grant() {
        let response = respond(Ok(Reply::empty()), Encoding::Binary, None);
        let headers = response.headers();

        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN), None);
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS), None);
        assert_eq!(headers.get(header::VARY), Some(&HeaderValue::from_static("origin")));
    }
}
