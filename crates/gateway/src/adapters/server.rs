//! HTTP/1.1 and HTTP/2 connection loops and per-request surface selection.

use std::{convert::Infallible, error::Error as StdError, net::SocketAddr, pin::pin, sync::Arc};

use bytes::Bytes;
use http::{HeaderValue, Method, Request, Response, StatusCode, header};
use http_body_util::{BodyExt, Limited, LengthLimitError};
use hyper::{
    body::{Body, Incoming},
    server::conn::{http1, http2},
    service::service_fn,
};
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::watch,
};
use tracing::debug;

use crate::{
    adapters::{GatewayBody, empty, full, json_response, native, rest, web},
    healthcheck,
    observability::metrics,
    router::{Protocol, ProtocolHandler, Sniffed},
    rpc::Status,
    shutdown,
    state::State,
};

const HEALTH_PATH: &str = "/healthz";
const METRICS_PATH: &str = "/metrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adapter {
    Native,
    Web(web::Encoding),
    Rest,
}

/// Serves claimed connections with hyper and picks a surface per request.
#[derive(Debug, Clone)]
pub(crate) struct HttpGateway {
    state: Arc<State>,
    shutdown: watch::Receiver<bool>,
}

impl HttpGateway {
    pub(crate) fn new(state: Arc<State>, shutdown: watch::Receiver<bool>) -> Self {
        Self { state, shutdown }
    }

    pub(crate) async fn handle<B>(
        &self,
        request: Request<B>,
        peer: SocketAddr,
        protocol: Protocol,
    ) -> Response<GatewayBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        if web::is_preflight(request.method(), request.headers()) {
            let origin = self.state.cors.allowed_origin(request.headers());
            return web::preflight(origin.as_ref());
        }

        if request.method() == Method::GET {
            match request.uri().path() {
                HEALTH_PATH => return healthcheck::handler(),
                METRICS_PATH => return metrics_response(),
                _ => {}
            }
        }

        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let adapter = if web::accepts(&content_type) {
            Adapter::Web(web::Encoding::from_content_type(&content_type))
        } else if native::accepts(&content_type) {
            if protocol != Protocol::Http2 {
                return plain_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
            }
            Adapter::Native
        } else if request.uri().path().starts_with(rest::PREFIX) {
            Adapter::Rest
        } else {
            return plain_status(StatusCode::NOT_FOUND);
        };

        let (parts, body) = request.into_parts();
        let origin = self.state.cors.allowed_origin(&parts.headers);
        let pipeline = &self.state.pipeline;

        let body = match read_body(body, self.state.max_body_bytes).await {
            Ok(body) => body,
            Err(status) => {
                return match adapter {
                    Adapter::Native => native::respond(Err(status)),
                    Adapter::Web(encoding) => web::respond(Err(status), encoding, origin.as_ref()),
                    Adapter::Rest => rest::respond(Err(status)),
                };
            }
        };

        match adapter {
            Adapter::Native => native::handle(pipeline, parts, body, peer).await,
            Adapter::Web(encoding) => {
                web::handle(pipeline, parts, body, peer, encoding, origin).await
            }
            Adapter::Rest => rest::handle(pipeline, parts, body, peer).await,
        }
    }
}

impl<S> ProtocolHandler<S> for HttpGateway
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn serve(&self, protocol: Protocol, stream: Sniffed<S>, peer: SocketAddr) {
        let io = TokioIo::new(stream);
        let gateway = self.clone();
        let service = service_fn(move |request: Request<Incoming>| {
            let gateway = gateway.clone();
            async move { Ok::<_, Infallible>(gateway.handle(request, peer, protocol).await) }
        });

        let mut shutdown = self.shutdown.clone();
        let mut draining = false;

        // Finish in-flight requests once shutdown is requested.
        match protocol {
            Protocol::Http2 => {
                let mut connection =
                    pin!(http2::Builder::new(TokioExecutor::new()).serve_connection(io, service));

                loop {
                    tokio::select! {
                        result = connection.as_mut() => {
                            if let Err(error) = result {
                                debug!(%peer, "http2 connection ended: {error}");
                            }
                            break;
                        }
                        () = shutdown::requested(&mut shutdown), if !draining => {
                            draining = true;
                            connection.as_mut().graceful_shutdown();
                        }
                    }
                }
            }
            Protocol::Http1 => {
                let mut connection = pin!(
                    http1::Builder::new()
                        .keep_alive(true)
                        .serve_connection(io, service)
                );

                loop {
                    tokio::select! {
                        result = connection.as_mut() => {
                            if let Err(error) = result {
                                debug!(%peer, "http1 connection ended: {error}");
                            }
                            break;
                        }
                        () = shutdown::requested(&mut shutdown), if !draining => {
                            draining = true;
                            connection.as_mut().graceful_shutdown();
                        }
                    }
                }
            }
        }
    }
}

async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, Status>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(error) if error.downcast_ref::<LengthLimitError>().is_some() => Err(
            Status::invalid_argument(format!("request body exceeds {limit} bytes")),
        ),
        Err(error) => Err(Status::invalid_argument(format!(
            "failed to read request body: {error}"
        ))),
    }
}

fn plain_status(status: StatusCode) -> Response<GatewayBody> {
    let mut response = Response::new(empty());
    *response.status_mut() = status;
    response
}

fn metrics_response() -> Response<GatewayBody> {
    let Some(exposition) = metrics::render() else {
        return json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &serde_json::json!({"code": "unavailable", "message": "metrics unavailable"}),
        );
    };

    let mut response = Response::new(full(exposition.body));

    if let Ok(content_type) = HeaderValue::from_str(&exposition.content_type) {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }

    response
}
