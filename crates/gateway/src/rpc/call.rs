//! Protocol-neutral call envelope.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use http::HeaderMap;
use portico_app::auth::Principal;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::rpc::Status;

/// Which adapter accepted the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Surface {
    Native,
    Web,
    Rest,
}

impl Surface {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "grpc",
            Self::Web => "grpc-web",
            Self::Rest => "rest",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport facts lifted out of headers by the normalization stage.
#[derive(Debug, Clone, Default)]
pub(crate) struct Metadata {
    pub(crate) request_id: String,
    pub(crate) client_ip: Option<IpAddr>,
    pub(crate) user_agent: Option<String>,
    pub(crate) bearer: Option<String>,
    pub(crate) refresh_token: Option<String>,
    pub(crate) deadline: Option<Duration>,
}

#[derive(Debug)]
pub(crate) struct Call {
    pub(crate) method: String,
    pub(crate) surface: Surface,
    pub(crate) peer: SocketAddr,
    pub(crate) headers: HeaderMap,
    pub(crate) metadata: Metadata,
    pub(crate) principal: Option<Principal>,
    pub(crate) payload: Value,
}

impl Call {
    pub(crate) fn new(
        method: impl Into<String>,
        surface: Surface,
        peer: SocketAddr,
        headers: HeaderMap,
        payload: Value,
    ) -> Self {
        Self {
            method: method.into(),
            surface,
            peer,
            headers,
            metadata: Metadata::default(),
            principal: None,
            payload,
        }
    }

    /// Deserialize the request message.
    pub(crate) fn decode<T: DeserializeOwned>(&self) -> Result<T, Status> {
        // `null` and a missing body both mean "empty message".
        let payload = match &self.payload {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };

        serde_json::from_value(payload)
            .map_err(|error| Status::invalid_argument(format!("invalid request: {error}")))
    }

    pub(crate) fn principal(&self) -> Result<&Principal, Status> {
        self.principal
            .as_ref()
            .ok_or_else(|| Status::unauthenticated("credential required"))
    }
}

/// Cookie attached to a reply. Only honored by the HTTP/1.1 surfaces and
/// REST; native clients read the value from the message body instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SetCookie {
    pub(crate) name: &'static str,
    pub(crate) value: String,
    pub(crate) max_age: i64,
}

impl SetCookie {
    pub(crate) fn new(name: &'static str, value: impl Into<String>, max_age: i64) -> Self {
        Self {
            name,
            value: value.into(),
            max_age,
        }
    }

    pub(crate) fn removal(name: &'static str) -> Self {
        Self::new(name, "", 0)
    }

    pub(crate) fn header_value(&self) -> String {
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
            self.name, self.value, self.max_age
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reply {
    pub(crate) payload: Value,
    pub(crate) cookies: Vec<SetCookie>,
}

impl Reply {
    pub(crate) fn new(payload: Value) -> Self {
        Self {
            payload,
            cookies: Vec::new(),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    #[must_use]
    pub(crate) fn with_cookie(mut self, cookie: SetCookie) -> Self {
        self.cookies.push(cookie);
        self
    }
}
