//! REST gateway: HTTP verbs and paths mapped onto RPC method ids.

use std::{net::SocketAddr, time::Instant};

use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, header, request::Parts};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use tracing::error;

use crate::{
    adapters::{GatewayBody, json_response, reject},
    pipeline::{CallResult, Pipeline},
    rpc::{Call, Code, Status, Surface, methods},
};

pub(crate) const PREFIX: &str = "/api/";

/// Parameters coerced to integers when they parse as one.
const NUMERIC_PARAMS: &[&str] = &["id", "limit", "offset"];

struct Route {
    verb: &'static str,
    pattern: &'static str,
    method: &'static str,
}

const fn route(verb: &'static str, pattern: &'static str, method: &'static str) -> Route {
    Route {
        verb,
        pattern,
        method,
    }
}

static ROUTES: &[Route] = &[
    route("POST", "/api/v1/auth/signin", methods::SIGN_IN),
    route("POST", "/api/v1/auth/signup", methods::SIGN_UP),
    route("POST", "/api/v1/auth/signout", methods::SIGN_OUT),
    route("POST", "/api/v1/auth/refresh", methods::REFRESH_TOKEN),
    route("GET", "/api/v1/auth/me", methods::GET_CURRENT_USER),
    route("GET", "/api/v1/users", methods::LIST_USERS),
    route("POST", "/api/v1/users", methods::CREATE_USER),
    route("GET", "/api/v1/users/{id}", methods::GET_USER),
    route("PATCH", "/api/v1/users/{id}", methods::UPDATE_USER),
    route("DELETE", "/api/v1/users/{id}", methods::DELETE_USER),
    route(
        "GET",
        "/api/v1/users/{id}/access_tokens",
        methods::LIST_PERSONAL_ACCESS_TOKENS,
    ),
    route(
        "POST",
        "/api/v1/users/{id}/access_tokens",
        methods::CREATE_PERSONAL_ACCESS_TOKEN,
    ),
    route(
        "DELETE",
        "/api/v1/users/{id}/access_tokens/{token}",
        methods::DELETE_PERSONAL_ACCESS_TOKEN,
    ),
    route(
        "GET",
        "/api/v1/instance/profile",
        methods::GET_INSTANCE_PROFILE,
    ),
];

/// Routes carry at most two path parameters.
pub(crate) type PathParams<'a> = SmallVec<[(&'static str, &'a str); 2]>;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolution<'a> {
    Found {
        method: &'static str,
        params: PathParams<'a>,
    },
    MethodNotAllowed,
    NotFound,
}

/// Find the method id served at `verb` + `path`.
pub(crate) fn resolve<'a>(verb: &str, path: &'a str) -> Resolution<'a> {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    let mut path_known = false;

    for route in ROUTES {
        let Some(params) = match_pattern(route.pattern, path) else {
            continue;
        };

        if route.verb == verb {
            return Resolution::Found {
                method: route.method,
                params,
            };
        }

        path_known = true;
    }

    if path_known {
        Resolution::MethodNotAllowed
    } else {
        Resolution::NotFound
    }
}

fn match_pattern<'a>(
    pattern: &'static str,
    path: &'a str,
) -> Option<PathParams<'a>> {
    let mut params = PathParams::new();
    let mut expected = pattern.split('/');
    let mut actual = path.split('/');

    loop {
        match (expected.next(), actual.next()) {
            (None, None) => return Some(params),
            (Some(segment), Some(value)) => {
                match segment
                    .strip_prefix('{')
                    .and_then(|name| name.strip_suffix('}'))
                {
                    Some(name) if !value.is_empty() => params.push((name, value)),
                    Some(_) => return None,
                    None if segment == value => {}
                    None => return None,
                }
            }
            _ => return None,
        }
    }
}

pub(crate) async fn handle(
    pipeline: &Pipeline,
    parts: Parts,
    body: Bytes,
    peer: SocketAddr,
) -> Response<GatewayBody> {
    let started = Instant::now();

    let (method, params) = match resolve(parts.method.as_str(), parts.uri.path()) {
        Resolution::Found { method, params } => (method, params),
        Resolution::MethodNotAllowed => {
            return error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                Code::InvalidArgument,
                "method not allowed",
            );
        }
        Resolution::NotFound => {
            return error_response(StatusCode::NOT_FOUND, Code::NotFound, "no such route");
        }
    };

    let payload = build_payload(&body, parts.uri.query(), &params);

    let result = match payload {
        Ok(payload) => {
            pipeline
                .call(Call::new(method, Surface::Rest, peer, parts.headers, payload))
                .await
        }
        Err(status) => {
            reject(method, Surface::Rest, started, &status);
            Err(status)
        }
    };

    respond(result)
}

pub(crate) fn respond(result: CallResult) -> Response<GatewayBody> {
    match result {
        Ok(reply) => {
            let mut response = json_response(StatusCode::OK, &reply.payload);
            let headers = response.headers_mut();

            for cookie in reply.cookies {
                match HeaderValue::from_str(&cookie.header_value()) {
                    Ok(value) => {
                        headers.append(header::SET_COOKIE, value);
                    }
                    Err(invalid) => {
                        error!(cookie = cookie.name, "invalid cookie value: {invalid}");
                    }
                }
            }

            response
        }
        Err(status) => error_response(status.code.http(), status.code, &status.message),
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'a str,
}

fn error_response(http_status: StatusCode, code: Code, message: &str) -> Response<GatewayBody> {
    json_response(
        http_status,
        &ErrorBody {
            code: code.as_str(),
            message,
        },
    )
}

/// Body object, then query parameters, then path parameters; later sources
/// win on key collisions.
fn build_payload(
    body: &[u8],
    query: Option<&str>,
    params: &[(&'static str, &str)],
) -> Result<Value, Status> {
    let mut object = if body.is_empty() {
        Map::new()
    } else {
        match serde_json::from_slice(body) {
            Ok(Value::Object(object)) => object,
            Ok(_) => return Err(Status::invalid_argument("request body must be a JSON object")),
            Err(parse_error) => {
                return Err(Status::invalid_argument(format!(
                    "invalid JSON body: {parse_error}"
                )));
            }
        }
    };

    for pair in query.unwrap_or_default().split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_query_component(key);
        let value = decode_query_component(value);

        object.insert(key.clone(), scalar(&key, value));
    }

    for (name, value) in params {
        object.insert((*name).to_string(), scalar(name, decode_path_segment(value)));
    }

    Ok(Value::Object(object))
}

fn scalar(key: &str, raw: String) -> Value {
    if NUMERIC_PARAMS.contains(&key)
        && let Ok(number) = raw.parse::<i64>()
    {
        return Value::from(number);
    }

    Value::String(raw)
}

// Query strings use form encoding, where `+` stands for a space.
fn decode_query_component(raw: &str) -> String {
    decode_path_segment(&raw.replace('+', " "))
}

fn decode_path_segment(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}
