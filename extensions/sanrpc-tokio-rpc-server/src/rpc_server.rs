//! A TCP (and, on Unix, Unix-socket) server for a [`RpcServiceEndpoint`].
//!
//! Every accepted connection runs a three stage pipeline: a reader decoding
//! frames into an inbound queue, a dispatcher spawning one task per request,
//! and a writer draining the outbound queue back onto the socket. The stages
//! share one cancellation signal; whichever stage fails first tears the whole
//! connection down.

use crate::{RpcServerConfig, RpcServerError, RpcServerState};
use parking_lot::Mutex;
use sanrpc::frame::{FrameCodec, FrameDecodeError, read_frame, write_frame};
use sanrpc::rpc::RpcMessage;
use sanrpc_service::RpcErrorCode;
use sanrpc_service_endpoint::{RpcServiceEndpoint, RpcServiceEndpointInterface};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// First delay after a failed `accept`.
const ACCEPT_BACKOFF_INITIAL: Duration = Duration::from_millis(5);

/// Upper bound for the doubling accept back-off.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Counts a request from the moment it is read until its response is written
/// or discarded.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type PipelineItem = (RpcMessage, InFlightGuard);

/// Shared state of one connection's pipeline.
#[derive(Clone)]
struct Connection {
    peer: Arc<str>,
    endpoint: Arc<RpcServiceEndpoint>,
    cancel: Arc<watch::Sender<bool>>,
    in_flight: Arc<AtomicUsize>,
    config: Arc<RpcServerConfig>,
}

impl Connection {
    fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    async fn cancelled(&self) {
        signalled(&mut self.cancel.subscribe()).await;
    }
}

struct ConnectionHandle {
    peer: Arc<str>,
    cancel: Arc<watch::Sender<bool>>,
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

/// An RPC server that accepts connections and serves an endpoint over them.
pub struct RpcServer {
    endpoint: Arc<RpcServiceEndpoint>,
    config: Arc<RpcServerConfig>,
    state: AtomicU8,
    /// Stops the accept loops.
    stop: watch::Sender<bool>,
    in_flight: Arc<AtomicUsize>,
    connections: Mutex<HashMap<u64, ConnectionHandle>>,
    next_connection_id: AtomicU64,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl RpcServer {
    pub fn new(endpoint: RpcServiceEndpoint) -> Self {
        Self::with_config(endpoint, RpcServerConfig::default())
    }

    pub fn with_config(endpoint: RpcServiceEndpoint, config: RpcServerConfig) -> Self {
        let (stop, _) = watch::channel(false);
        RpcServer {
            endpoint: Arc::new(endpoint),
            config: Arc::new(config),
            state: AtomicU8::new(RpcServerState::Running.into()),
            stop,
            in_flight: Arc::new(AtomicUsize::new(0)),
            connections: Mutex::new(HashMap::new()),
            next_connection_id: AtomicU64::new(0),
            local_addr: Mutex::new(None),
        }
    }

    /// Returns the endpoint this server dispatches to.
    pub fn endpoint(&self) -> Arc<RpcServiceEndpoint> {
        self.endpoint.clone()
    }

    pub fn state(&self) -> RpcServerState {
        RpcServerState::try_from(self.state.load(Ordering::SeqCst)).unwrap_or(RpcServerState::Closed)
    }

    /// Address of the most recently bound TCP listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn active_connections(&self) -> usize {
        self.connections.lock().len()
    }

    /// Requests read but not yet answered, across all connections.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Binds to an address and serves until the server is shut down.
    pub async fn serve<A: ToSocketAddrs>(self: Arc<Self>, addr: A) -> Result<(), RpcServerError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_listener(listener).await
    }

    /// Convenience wrapper around [`serve`](Self::serve) taking a host and port.
    pub async fn serve_on(self: Arc<Self>, host: &str, port: u16) -> Result<(), RpcServerError> {
        self.serve(format!("{host}:{port}")).await
    }

    /// Serves on a pre-bound listener.
    ///
    /// Useful for binding to port 0 first and reading the assigned port back.
    pub async fn serve_with_listener(self: Arc<Self>, listener: TcpListener) -> Result<(), RpcServerError> {
        let address = listener.local_addr()?;
        *self.local_addr.lock() = Some(address);
        tracing::info!("Server running on {:?}", address);
        self.accept_loop(Listener::Tcp(listener)).await
    }

    /// Serves on a Unix domain socket listener.
    #[cfg(unix)]
    pub async fn serve_with_unix_listener(
        self: Arc<Self>,
        listener: tokio::net::UnixListener,
    ) -> Result<(), RpcServerError> {
        tracing::info!("Server running on {:?}", listener.local_addr()?);
        self.accept_loop(Listener::Unix(listener)).await
    }

    /// Serves a single, already established byte stream.
    ///
    /// This is the hook for transport decorators such as TLS: wrap the raw
    /// connection, then hand the wrapped stream to the server.
    pub fn serve_stream<S>(self: &Arc<Self>, stream: S, peer: impl Into<String>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.clone().spawn_connection(stream, peer.into());
    }

    async fn accept_loop(self: Arc<Self>, listener: Listener) -> Result<(), RpcServerError> {
        if self.state() != RpcServerState::Running {
            return Err(RpcServerError::NotRunning);
        }

        let mut stop = self.stop.subscribe();
        let mut backoff = Duration::ZERO;

        loop {
            let accepted = tokio::select! {
                _ = signalled(&mut stop) => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok(Accepted::Tcp(stream, peer)) => {
                    backoff = Duration::ZERO;
                    if let Err(err) = stream.set_nodelay(true) {
                        tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer, err);
                    }
                    self.clone().spawn_connection(stream, peer.to_string());
                }
                #[cfg(unix)]
                Ok(Accepted::Unix(stream, peer)) => {
                    backoff = Duration::ZERO;
                    self.clone().spawn_connection(stream, peer);
                }
                Err(err) => {
                    backoff = if backoff.is_zero() {
                        ACCEPT_BACKOFF_INITIAL
                    } else {
                        (backoff * 2).min(ACCEPT_BACKOFF_MAX)
                    };
                    tracing::warn!("Accept error: {}; retrying in {:?}", err, backoff);
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    fn spawn_connection<S>(self: Arc<Self>, stream: S, peer: String)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.state() != RpcServerState::Running {
            tracing::debug!("Rejecting connection from {} while shutting down", peer);
            return;
        }

        let peer: Arc<str> = peer.into();
        let (cancel, _) = watch::channel(false);
        let cancel = Arc::new(cancel);
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        self.connections.lock().insert(
            id,
            ConnectionHandle {
                peer: peer.clone(),
                cancel: cancel.clone(),
            },
        );
        // A forced close may have swept the table just before the insert.
        if self.state() == RpcServerState::Closed {
            cancel.send_replace(true);
        }

        tracing::info!("Client connected: {}", peer);

        let connection = Connection {
            peer,
            endpoint: self.endpoint.clone(),
            cancel,
            in_flight: self.in_flight.clone(),
            config: self.config.clone(),
        };

        tokio::spawn(async move {
            Self::run_pipeline(connection.clone(), stream).await;

            self.connections.lock().remove(&id);
            connection.endpoint.hooks().run_post_close(&connection.peer);
            tracing::info!("Terminated connection for {}.", connection.peer);
        });
    }

    /// Runs the three stages of one connection and waits for all of them.
    async fn run_pipeline<S>(connection: Connection, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let capacity = connection.config.pipeline_queue_capacity.max(1);
        let (in_tx, in_rx) = mpsc::channel::<PipelineItem>(capacity);
        let (out_tx, out_rx) = mpsc::channel::<PipelineItem>(capacity);

        let reader_task = tokio::spawn(Self::read_stage(connection.clone(), reader, in_tx));
        let dispatch_task = tokio::spawn(Self::dispatch_stage(connection.clone(), in_rx, out_tx));
        let writer_task = tokio::spawn(Self::write_stage(connection.clone(), writer, out_rx));

        let (read, dispatch, write) = tokio::join!(reader_task, dispatch_task, writer_task);
        for (stage, result) in [("reader", read), ("dispatcher", dispatch), ("writer", write)] {
            if let Err(err) = result {
                tracing::error!("Pipeline {} for {} failed: {}", stage, connection.peer, err);
            }
        }
    }

    /// Decodes frames into the inbound queue until the stream ends or breaks.
    async fn read_stage<R>(connection: Connection, mut reader: R, in_tx: mpsc::Sender<PipelineItem>)
    where
        R: AsyncRead + Unpin,
    {
        let hooks = connection.endpoint.hooks();
        let max_body = connection.config.max_frame_body_size;

        loop {
            hooks.run_pre_read(&connection.peer);

            let frame = tokio::select! {
                _ = connection.cancelled() => break,
                frame = read_with_timeout(&mut reader, max_body, connection.config.read_timeout) => frame,
            };

            let message = match frame {
                Ok(message) => message,
                Err(err) if err.is_disconnect() => {
                    tracing::debug!("Client {} disconnected: {}", connection.peer, err);
                    break;
                }
                Err(err) => {
                    tracing::error!("Closing connection to {}: {}", connection.peer, err);
                    break;
                }
            };

            hooks.run_post_read(&connection.peer, &message);

            if !message.is_request() {
                tracing::debug!(
                    "Discarding non-request message {} from {}",
                    message.sequence,
                    connection.peer
                );
                continue;
            }

            let item = (message, InFlightGuard::new(&connection.in_flight));
            tokio::select! {
                _ = connection.cancelled() => break,
                sent = in_tx.send(item) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        connection.cancel();
    }

    /// Spawns one task per request; a panicking handler only affects its own task.
    async fn dispatch_stage(
        connection: Connection,
        mut in_rx: mpsc::Receiver<PipelineItem>,
        out_tx: mpsc::Sender<PipelineItem>,
    ) {
        loop {
            let (request, guard) = tokio::select! {
                _ = connection.cancelled() => break,
                next = in_rx.recv() => match next {
                    Some(item) => item,
                    None => break,
                },
            };

            let connection = connection.clone();
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                let Some(response) = connection.endpoint.dispatch(&connection.peer, request).await
                else {
                    return;
                };

                // A full queue stalls this task only, throttling a slow writer.
                tokio::select! {
                    _ = connection.cancelled() => {}
                    _ = out_tx.send((response, guard)) => {}
                }
            });
        }
    }

    /// Frames and writes responses from the outbound queue.
    async fn write_stage<W>(connection: Connection, mut writer: W, mut out_rx: mpsc::Receiver<PipelineItem>)
    where
        W: AsyncWrite + Unpin,
    {
        let hooks = connection.endpoint.hooks();

        loop {
            let (mut response, _guard) = tokio::select! {
                _ = connection.cancelled() => break,
                next = out_rx.recv() => match next {
                    Some(item) => item,
                    None => break,
                },
            };

            hooks.run_pre_write(&connection.peer, &mut response);

            let frame = match FrameCodec::encode(&response) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::error!(
                        "Failed to encode response {} for {}: {}",
                        response.sequence,
                        connection.peer,
                        err
                    );
                    let fallback = RpcMessage::error_response_to(
                        &response,
                        RpcErrorCode::ServerMarshalFail.to_error_info(err.to_string()),
                    );
                    match FrameCodec::encode(&fallback) {
                        Ok(frame) => frame,
                        Err(_) => continue,
                    }
                }
            };

            let written = write_with_timeout(&mut writer, &frame, connection.config.write_timeout).await;
            hooks.run_post_write(&connection.peer, &response, written.as_ref().err());

            if let Err(err) = written {
                tracing::warn!("Write to {} failed: {}", connection.peer, err);
                break;
            }
        }

        connection.cancel();
        let _ = writer.shutdown().await;
    }

    /// Stops accepting, waits for in-flight requests to drain, then closes
    /// every connection.
    ///
    /// Draining is checked every `shutdown_poll_interval`. When `timeout`
    /// elapses first the remaining connections are closed anyway and
    /// `ShutdownTimedOut` is returned.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RpcServerError> {
        let began = self
            .state
            .compare_exchange(
                RpcServerState::Running.into(),
                RpcServerState::ShuttingDown.into(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !began {
            tracing::debug!("Shutdown requested while already {:?}", self.state());
            return Ok(());
        }

        self.stop.send_replace(true);
        tracing::info!("Server shutting down; draining {} requests", self.in_flight());

        let deadline = Instant::now() + timeout;
        let in_flight = loop {
            let in_flight = self.in_flight();
            if in_flight == 0 {
                break 0;
            }
            let now = Instant::now();
            if now >= deadline {
                break in_flight;
            }
            tokio::time::sleep(self.config.shutdown_poll_interval.min(deadline - now)).await;
        };

        self.close();

        if in_flight == 0 {
            Ok(())
        } else {
            tracing::warn!("Shutdown deadline passed with {} requests in flight", in_flight);
            Err(RpcServerError::ShutdownTimedOut { in_flight })
        }
    }

    /// Stops accepting and closes every connection immediately.
    pub fn close(&self) {
        self.state.store(RpcServerState::Closed.into(), Ordering::SeqCst);
        self.stop.send_replace(true);

        let connections = self.connections.lock();
        for handle in connections.values() {
            tracing::debug!("Force closing connection to {}", handle.peer);
            handle.cancel.send_replace(true);
        }
    }
}

enum Accepted {
    Tcp(TcpStream, SocketAddr),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream, String),
}

impl Listener {
    async fn accept(&self) -> io::Result<Accepted> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok(Accepted::Tcp(stream, peer))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, peer) = listener.accept().await?;
                let peer = peer
                    .as_pathname()
                    .map(|path| format!("unix@{}", path.display()))
                    .unwrap_or_else(|| "unix@unnamed".to_string());
                Ok(Accepted::Unix(stream, peer))
            }
        }
    }
}

/// Resolves once the watched flag turns true, or when its sender is gone.
async fn signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|set| *set).await;
}

async fn read_with_timeout<R>(
    reader: &mut R,
    max_body: usize,
    timeout: Option<Duration>,
) -> Result<RpcMessage, FrameDecodeError>
where
    R: AsyncRead + Unpin,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, read_frame(reader, max_body))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))?,
        None => read_frame(reader, max_body).await,
    }
}

async fn write_with_timeout<W>(writer: &mut W, frame: &[u8], timeout: Option<Duration>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, write_frame(writer, frame))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))?,
        None => write_frame(writer, frame).await,
    }
}
