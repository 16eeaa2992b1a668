//! Single-listener connection router.
//!
//! Every accepted connection is sniffed through [`Sniffed`] and handed, with
//! its consumed prefix intact, to the [`ProtocolHandler`] for the first
//! matching protocol. Connections that match nothing are closed.

use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinSet,
    time,
};
use tracing::{debug, info, warn};

use crate::{observability::metrics, shutdown};

mod matchers;
mod sniffed;

pub(crate) use matchers::{Http1RequestLine, Http2Preface, Match, Matcher, Protocol};
pub(crate) use sniffed::Sniffed;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RouterConfig {
    pub(crate) sniff_timeout: Duration,
    pub(crate) prefix_limit: usize,
    pub(crate) drain_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            sniff_timeout: Duration::from_secs(5),
            prefix_limit: 1_024,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum RouterError {
    #[error("listener failed to accept connections")]
    Accept(#[source] io::Error),
}

/// Why a connection was closed without a handler.
#[derive(Debug, Error)]
pub(crate) enum SniffError {
    #[error("no protocol matched the connection prefix")]
    Unrecognized,

    #[error("prefix limit reached before a protocol matched")]
    PrefixLimit,

    #[error("peer closed the connection before a protocol matched")]
    Closed,

    #[error("timed out waiting for the connection prefix")]
    Timeout,

    #[error("failed to read the connection prefix")]
    Io(#[from] io::Error),
}

/// Serves a connection once its protocol is known.
pub(crate) trait ProtocolHandler<S>: Send + Sync {
    fn serve(
        &self,
        protocol: Protocol,
        stream: Sniffed<S>,
        peer: SocketAddr,
    ) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone)]
pub(crate) struct ConnectionRouter {
    config: RouterConfig,
    matchers: Arc<[Box<dyn Matcher>]>,
}

impl ConnectionRouter {
    /// Router with the gateway's matchers in priority order.
    pub(crate) fn new(config: RouterConfig) -> Self {
        Self::with_matchers(
            config,
            vec![Box::new(Http2Preface), Box::new(Http1RequestLine)],
        )
    }

    pub(crate) fn with_matchers(config: RouterConfig, matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self {
            config,
            matchers: matchers.into(),
        }
    }

    /// Read from `stream` until a matcher claims it.
    pub(crate) async fn classify<S>(
        &self,
        stream: &mut Sniffed<S>,
    ) -> Result<Protocol, SniffError>
    where
        S: AsyncRead + Unpin,
    {
        loop {
            if let Some(protocol) = self.decide(stream.prefix())? {
                return Ok(protocol);
            }

            if stream.prefix().len() >= self.config.prefix_limit {
                return Err(SniffError::PrefixLimit);
            }

            if stream.fill(self.config.prefix_limit).await? == 0 {
                return Err(SniffError::Closed);
            }
        }
    }

    /// Sniff and hand off one connection. Returns the protocol it was routed
    /// to, or `None` when it was closed unclaimed.
    pub(crate) async fn route<S, H>(
        &self,
        stream: S,
        peer: SocketAddr,
        handler: &H,
    ) -> Option<Protocol>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
        H: ProtocolHandler<S>,
    {
        let mut sniffed = Sniffed::new(stream);

        let classified = time::timeout(self.config.sniff_timeout, self.classify(&mut sniffed))
            .await
            .unwrap_or(Err(SniffError::Timeout));

        let protocol = match classified {
            Ok(protocol) => protocol,
            Err(reason) => {
                debug!(%peer, "closing unrecognized connection: {reason}");
                return None;
            }
        };

        metrics::observe_connection(protocol.as_str());
        debug!(%peer, %protocol, "connection routed");

        handler.serve(protocol, sniffed, peer).await;

        Some(protocol)
    }

    /// Accept loop. Returns once `shutdown` fires and open connections have
    /// drained, or with an error when the listener itself fails.
    pub(crate) async fn serve<H>(
        &self,
        listener: TcpListener,
        handler: H,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RouterError>
    where
        H: ProtocolHandler<TcpStream> + Clone + 'static,
    {
        let mut connections = JoinSet::new();

        if let Ok(addr) = listener.local_addr() {
            info!("listening on {addr}");
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(error) = stream.set_nodelay(true) {
                            debug!(%peer, "failed to set TCP_NODELAY: {error}");
                        }

                        let router = self.clone();
                        let handler = handler.clone();

                        connections.spawn(async move {
                            router.route(stream, peer, &handler).await;
                        });
                    }
                    Err(error) => match AcceptFailure::classify(&error) {
                        AcceptFailure::Connection => {
                            debug!("dropped connection during accept: {error}");
                        }
                        AcceptFailure::Exhausted => {
                            warn!(backoff = ?ACCEPT_BACKOFF, "accept failed, pausing: {error}");

                            tokio::select! {
                                () = time::sleep(ACCEPT_BACKOFF) => {}
                                () = shutdown::requested(&mut shutdown) => break,
                            }
                        }
                        AcceptFailure::Fatal => return Err(RouterError::Accept(error)),
                    },
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                () = shutdown::requested(&mut shutdown) => break,
            }
        }

        info!(open = connections.len(), "stopped accepting connections");

        let drained = time::timeout(self.config.drain_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                open = connections.len(),
                "drain timeout elapsed, aborting open connections"
            );
            connections.abort_all();
        }

        Ok(())
    }

    /// First matcher that does not reject decides; `Ok(None)` waits for more
    /// bytes.
    fn decide(&self, prefix: &[u8]) -> Result<Option<Protocol>, SniffError> {
        for matcher in self.matchers.iter() {
            match matcher.check(prefix) {
                Match::Matched => return Ok(Some(matcher.protocol())),
                Match::NeedMore => return Ok(None),
                Match::Rejected => {}
            }
        }

        Err(SniffError::Unrecognized)
    }
}

/// Pause after the process or system runs out of descriptors or buffers.
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

#[cfg(unix)]
const ENFILE: i32 = 23;
#[cfg(unix)]
const EMFILE: i32 = 24;
#[cfg(any(target_os = "linux", target_os = "android"))]
const ENOBUFS: i32 = 105;
#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
const ENOBUFS: i32 = 55;

#[cfg(unix)]
const EXHAUSTION_ERRNOS: &[i32] = &[ENFILE, EMFILE, ENOBUFS];
#[cfg(windows)]
const EXHAUSTION_ERRNOS: &[i32] = &[10024, 10055];
#[cfg(not(any(unix, windows)))]
const EXHAUSTION_ERRNOS: &[i32] = &[];

/// How the accept loop reacts to a failed `accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// Only the connection being accepted is affected.
    Connection,
    /// Resource limits; accepting resumes after [`ACCEPT_BACKOFF`].
    Exhausted,
    Fatal,
}

impl AcceptFailure {
    fn classify(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock => Self::Connection,
            io::ErrorKind::OutOfMemory => Self::Exhausted,
            _ if error
                .raw_os_error()
                .is_some_and(|code| EXHAUSTION_ERRNOS.contains(&code)) =>
            {
                Self::Exhausted
            }
            _ => Self::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use testresult::TestResult;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    use super::*;
    use crate::router::matchers::HTTP2_PREFACE;

    type Seen = Arc<Mutex<Vec<(Protocol, Vec<u8>)>>>;

    /// Records the protocol and every byte the adapter would have read.
    #[derive(Debug, Clone, Default)]
    struct Recorder {
        seen: Seen,
    }

    impl Recorder {
        fn seen(&self) -> Vec<(Protocol, Vec<u8>)> {
            self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
        }
    }

    impl<S> ProtocolHandler<S> for Recorder
    where
        S: AsyncRead + Unpin + Send,
    {
        async fn serve(&self, protocol: Protocol, mut stream: Sniffed<S>, _peer: SocketAddr) {
            let mut bytes = Vec::new();
            let _read = stream.read_to_end(&mut bytes).await;

            if let Ok(mut seen) = self.seen.lock() {
                seen.push((protocol, bytes));
            }
        }
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 50_000))
    }

    async fn route_bytes(chunks: &[&[u8]]) -> TestResult<(Option<Protocol>, Recorder)> {
        let (mut client, server): (DuplexStream, DuplexStream) = duplex(4_096);

        for chunk in chunks {
            client.write_all(chunk).await?;
        }
        drop(client);

        let recorder = Recorder::default();
        let routed = ConnectionRouter::new(RouterConfig::default())
            .route(server, peer(), &recorder)
            .await;

        Ok((routed, recorder))
    }

    #[tokio::test]
    async fn http2_preface_goes_to_the_multiplexed_loop_with_bytes_intact() -> TestResult {
        let mut payload = HTTP2_PREFACE.to_vec();
        payload.extend_from_slice(b"\x00\x00\x00\x04\x00\x00\x00\x00\x00");

        let (routed, recorder) = route_bytes(&[payload.as_slice()]).await?;

        assert_eq!(routed, Some(Protocol::Http2));
        assert_eq!(recorder.seen(), [(Protocol::Http2, payload)]);

        Ok(())
    }

    #[tokio::test]
    async fn request_line_goes_to_the_http1_loop() -> TestResult {
        let request = b"GET /healthz HTTP/1.1\r\nHost: localhost\r\n\r\n";

        let (routed, recorder) = route_bytes(&[request.as_slice()]).await?;

        assert_eq!(routed, Some(Protocol::Http1));
        assert_eq!(recorder.seen(), [(Protocol::Http1, request.to_vec())]);

        Ok(())
    }

    #[tokio::test]
    async fn preface_split_across_writes_still_matches() -> TestResult {
        let (head, tail) = HTTP2_PREFACE.split_at(3);

        let (routed, _) = route_bytes(&[head, tail]).await?;

        assert_eq!(routed, Some(Protocol::Http2));

        Ok(())
    }

    #[tokio::test]
    async fn unknown_protocol_is_closed_without_a_handler() -> TestResult {
        let client_hello = b"\x16\x03\x01\x00\xa5\x01\x00\x00";

        let (routed, recorder) = route_bytes(&[client_hello.as_slice()]).await?;

        assert_eq!(routed, None);
        assert!(recorder.seen().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn peer_closing_mid_prefix_is_dropped() -> TestResult {
        let (routed, recorder) = route_bytes(&[b"PRI * HT".as_slice()]).await?;

        assert_eq!(routed, None);
        assert!(recorder.seen().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn prefix_limit_bounds_the_request_line() -> TestResult {
        let mut line = b"GET /".to_vec();
        line.extend(std::iter::repeat_n(b'a', 2_048));

        let (routed, recorder) = route_bytes(&[line.as_slice()]).await?;

        assert_eq!(routed, None);
        assert!(recorder.seen().is_empty());

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() -> TestResult {
        let (mut client, server) = duplex(64);
        client.write_all(b"GE").await?;

        let recorder = Recorder::default();
        let routed = ConnectionRouter::new(RouterConfig::default())
            .route(server, peer(), &recorder)
            .await;

        assert_eq!(routed, None);
        assert!(recorder.seen().is_empty());

        drop(client);

        Ok(())
    }

    #[tokio::test]
    async fn accept_loop_routes_and_stops_on_shutdown() -> TestResult {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let recorder = Recorder::default();

        let server = tokio::spawn({
            let recorder = recorder.clone();
            async move {
                ConnectionRouter::new(RouterConfig::default())
                    .serve(listener, recorder, shutdown_rx)
                    .await
            }
        });

        let mut client = TcpStream::connect(addr).await?;
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await?;
        client.shutdown().await?;
        drop(client);

        for _ in 0..100 {
            if !recorder.seen().is_empty() {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true)?;
        server.await??;

        assert_eq!(
            recorder.seen(),
            [(Protocol::Http1, b"GET / HTTP/1.1\r\n\r\n".to_vec())]
        );

        Ok(())
    }

    #[test]
    fn descriptor_and_buffer_exhaustion_back_off_instead_of_failing() {
        for code in EXHAUSTION_ERRNOS {
            assert_eq!(
                AcceptFailure::classify(&io::Error::from_raw_os_error(*code)),
                AcceptFailure::Exhausted,
                "os error {code}"
            );
        }

        assert_eq!(
            AcceptFailure::classify(&io::ErrorKind::OutOfMemory.into()),
            AcceptFailure::Exhausted
        );
    }

    #[cfg(unix)]
    #[test]
    fn too_many_open_files_is_not_fatal() {
        let error = io::Error::from_raw_os_error(EMFILE);

        assert_ne!(AcceptFailure::classify(&error), AcceptFailure::Fatal);
    }

    #[test]
    fn per_connection_and_listener_failures_are_told_apart() {
        assert_eq!(
            AcceptFailure::classify(&io::ErrorKind::ConnectionAborted.into()),
            AcceptFailure::Connection
        );
        assert_eq!(
            AcceptFailure::classify(&io::ErrorKind::PermissionDenied.into()),
            AcceptFailure::Fatal
        );
    }
}
