//! Lift transport headers into the call's [`Metadata`].

use std::{net::IpAddr, time::Duration};

use async_trait::async_trait;
use http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE, USER_AGENT},
};
use portico_app::auth::REFRESH_COOKIE;
use uuid::Uuid;

use crate::{
    pipeline::{CallResult, Interceptor, Next},
    rpc::{Call, Metadata},
};

pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const REAL_IP_HEADER: &str = "x-real-ip";
const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

#[derive(Debug, Clone, Copy)]
pub(crate) struct Normalize;

#[async_trait]
impl Interceptor for Normalize {
    fn name(&self) -> &'static str {
        "normalize"
    }

    async fn intercept(&self, mut call: Call, next: Next<'_>) -> CallResult {
        call.metadata = metadata(&call.headers, call.peer.ip());

        next.run(call).await
    }
}

fn metadata(headers: &HeaderMap, peer: IpAddr) -> Metadata {
    Metadata {
        request_id: header(headers, REQUEST_ID_HEADER)
            .filter(|value| !value.is_empty())
            .map_or_else(|| Uuid::now_v7().to_string(), ToOwned::to_owned),
        client_ip: Some(client_ip(headers).unwrap_or(peer)),
        user_agent: header(headers, USER_AGENT.as_str()).map(ToOwned::to_owned),
        bearer: header(headers, AUTHORIZATION.as_str())
            .and_then(extract_bearer_token)
            .map(ToOwned::to_owned),
        refresh_token: cookie(headers, REFRESH_COOKIE).map(ToOwned::to_owned),
        deadline: header(headers, GRPC_TIMEOUT_HEADER).and_then(parse_grpc_timeout),
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

/// First hop of `x-forwarded-for`, then `x-real-ip`.
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    header(headers, FORWARDED_FOR_HEADER)
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or_else(|| header(headers, REAL_IP_HEADER).and_then(|value| value.parse().ok()))
}

pub(crate) fn extract_bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next()?;
    let token = parts.next()?.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }

    Some(token)
}

fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// `grpc-timeout`: up to eight ASCII digits followed by a unit letter.
pub(crate) fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let unit = value.chars().next_back()?;
    let digits = value.strip_suffix(unit)?;

    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let amount: u64 = digits.parse().ok()?;

    match unit {
        'H' => Some(Duration::from_secs(amount * 60 * 60)),
        'M' => Some(Duration::from_secs(amount * 60)),
        'S' => Some(Duration::from_secs(amount)),
        'm' => Some(Duration::from_millis(amount)),
        'u' => Some(Duration::from_micros(amount)),
        'n' => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}
