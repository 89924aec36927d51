use crate::{BoxedStream, RpcClientConfig, RpcConnector, TcpConnector};
use futures::StreamExt;
use parking_lot::Mutex;
use sanrpc::frame::{FrameDecodeError, read_frame, write_frame};
use sanrpc::rpc::RpcMessage;
use sanrpc_service::CallContext;
use sanrpc_service_caller::{
    CompletionSender, OutboundCall, RpcCallDispatcher, RpcCallerError, RpcServiceCallerInterface,
    RpcTransportState, completion_channel,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

type StateChangeHandler = Box<dyn Fn(RpcTransportState) + Send + Sync>;

/// Reports transport state changes, emitting `Disconnected` at most once.
#[derive(Default)]
struct StateNotifier {
    handler: Mutex<Option<StateChangeHandler>>,
    disconnected: AtomicBool,
}

impl StateNotifier {
    fn disconnected(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handler) = self.handler.lock().as_ref() {
            handler(RpcTransportState::Disconnected);
        }
    }
}

/// State shared between the client handle and its background tasks.
struct ClientInner {
    peer: String,
    dispatcher: RpcCallDispatcher,
    tx: mpsc::UnboundedSender<OutboundCall>,
    close: watch::Sender<bool>,
    notifier: StateNotifier,
}

impl ClientInner {
    /// Registers a call and queues its frame for the writer task.
    ///
    /// Returns the sequence of the queued request, or `None` when the call
    /// failed immediately and `done` already holds the error.
    fn send_call<A>(
        &self,
        ctx: &CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
        expect_reply: bool,
        done: CompletionSender,
    ) -> Option<u64>
    where
        A: Serialize + ?Sized,
    {
        let outbound = self
            .dispatcher
            .begin_call(ctx, service_name, method_name, args, expect_reply, done)?;
        let sequence = outbound.sequence;

        if let Err(mpsc::error::SendError(outbound)) = self.tx.send(outbound) {
            self.dispatcher.complete_write(outbound, Err(RpcCallerError::Shutdown));
        }
        Some(sequence)
    }

    async fn call<A, R>(
        &self,
        ctx: &mut CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
        expect_reply: bool,
    ) -> Result<R, RpcCallerError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (done, mut completions) = completion_channel(1);
        let sequence = self.send_call(ctx, service_name, method_name, args, expect_reply, done);
        let mut guard = sequence.map(|sequence| PendingGuard {
            dispatcher: &self.dispatcher,
            sequence,
            armed: true,
        });

        let completion = match ctx.remaining() {
            Some(left) => match tokio::time::timeout(left, completions.next()).await {
                Ok(completion) => completion,
                Err(_) if !expect_reply => {
                    // Oneway calls have no pending entry to fail; the queued
                    // frame may still be written after we return.
                    if let Some(guard) = guard.as_mut() {
                        guard.armed = false;
                    }
                    return Err(RpcCallerError::DeadlineExceeded);
                }
                Err(_) => {
                    if let Some(sequence) = sequence {
                        self.dispatcher
                            .fail_call(sequence, RpcCallerError::DeadlineExceeded);
                    }
                    // Either the deadline error or a reply that won the race.
                    completions.next().await
                }
            },
            None => completions.next().await,
        };

        if let Some(guard) = guard.as_mut() {
            guard.armed = false;
        }

        let mut completion = completion.ok_or(RpcCallerError::Shutdown)?;
        ctx.merge_response_metadata(std::mem::take(&mut completion.response_metadata));
        completion.decode()
    }
}

/// Fails a call whose caller stopped waiting for it.
struct PendingGuard<'a> {
    dispatcher: &'a RpcCallDispatcher,
    sequence: u64,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.dispatcher
                .fail_call(self.sequence, RpcCallerError::Cancelled);
        }
    }
}

/// A client bound to a single connection.
///
/// Any number of calls may be in flight at once; responses are matched to
/// their callers by sequence number, in whatever order they arrive. When the
/// connection is lost every pending call fails with
/// [`RpcCallerError::Shutdown`] and the client stops accepting calls.
pub struct RpcClient {
    inner: Arc<ClientInner>,
    tasks: Vec<JoinHandle<()>>,
}

impl RpcClient {
    /// Connects over TCP with the default configuration.
    pub async fn new(host: &str, port: u16) -> io::Result<RpcClient> {
        Self::connect("tcp", &format!("{host}:{port}"), RpcClientConfig::default()).await
    }

    pub async fn connect(network: &str, address: &str, config: RpcClientConfig) -> io::Result<RpcClient> {
        let connector = TcpConnector::new(config.tcp_keepalive);
        Self::connect_with(&connector, network, address, config).await
    }

    /// Connects through a custom connector, such as a TLS decorator.
    pub async fn connect_with(
        connector: &dyn RpcConnector,
        network: &str,
        address: &str,
        config: RpcClientConfig,
    ) -> io::Result<RpcClient> {
        let stream = connector
            .connect(network, address, config.connect_timeout)
            .await?;
        tracing::debug!("Connected to {}@{}", network, address);
        Ok(Self::from_stream(stream, format!("{network}@{address}"), config))
    }

    /// Runs a client over an already established stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_stream(stream: BoxedStream, peer: String, config: RpcClientConfig) -> RpcClient {
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        let (close, _) = watch::channel(false);

        let inner = Arc::new(ClientInner {
            peer,
            dispatcher: RpcCallDispatcher::new(config.codec_registry.clone()),
            tx,
            close,
            notifier: StateNotifier::default(),
        });

        let mut tasks = vec![
            tokio::spawn(read_loop(
                inner.clone(),
                reader,
                config.max_frame_body_size,
                config.read_timeout,
            )),
            tokio::spawn(write_loop(inner.clone(), writer, rx, config.write_timeout)),
        ];
        if config.heartbeat {
            tasks.push(tokio::spawn(heartbeat_loop(
                inner.clone(),
                config.heartbeat_interval,
            )));
        }

        RpcClient { inner, tasks }
    }

    /// The `network@address` this client is connected to.
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    /// Performs a request/response call.
    ///
    /// The call is bounded by `ctx.deadline` when set. Response metadata is
    /// merged into `ctx.response_metadata`. Dropping the returned future
    /// abandons the call; a reply arriving afterwards is discarded.
    pub async fn call<A, R>(
        &self,
        ctx: &mut CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
    ) -> Result<R, RpcCallerError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.inner
            .call(ctx, service_name, method_name, args, true)
            .await
    }

    /// Sends a request that gets no response.
    ///
    /// Resolves once the frame has been written.
    pub async fn call_oneway<A>(
        &self,
        ctx: &mut CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
    ) -> Result<(), RpcCallerError>
    where
        A: Serialize + ?Sized,
    {
        self.inner
            .call::<A, ()>(ctx, service_name, method_name, args, false)
            .await
    }

    /// Starts a call without waiting for it.
    ///
    /// The outcome is delivered to `done`, which may be shared by several
    /// calls. Returns the request's sequence number, or `None` when the call
    /// failed before it was sent (the failure is still delivered to `done`).
    pub fn send_call<A>(
        &self,
        ctx: &CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
        done: CompletionSender,
    ) -> Option<u64>
    where
        A: Serialize + ?Sized,
    {
        self.inner
            .send_call(ctx, service_name, method_name, args, true, done)
    }

    /// Abandons a call started with [`send_call`](Self::send_call).
    ///
    /// Returns `false` if the call had already completed.
    pub fn cancel_call(&self, sequence: u64) -> bool {
        self.inner
            .dispatcher
            .fail_call(sequence, RpcCallerError::Cancelled)
    }

    /// Fails every pending call and closes the connection.
    ///
    /// Only the first call does anything; later ones, and calls made after the
    /// connection was lost, return [`RpcCallerError::Shutdown`].
    pub fn close(&self) -> Result<(), RpcCallerError> {
        if !self.inner.dispatcher.mark_closing() {
            return Err(RpcCallerError::Shutdown);
        }
        let failed = self.inner.dispatcher.fail_all(|| RpcCallerError::Shutdown);
        tracing::debug!(
            "Closing client for {} ({} pending calls failed)",
            self.inner.peer,
            failed
        );
        self.inner.close.send_replace(true);
        Ok(())
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closing(&self) -> bool {
        self.inner.dispatcher.is_closing()
    }

    /// Whether the connection has been lost.
    pub fn is_shutdown(&self) -> bool {
        self.inner.dispatcher.is_shutdown()
    }

    /// Whether the client still accepts calls.
    pub fn is_available(&self) -> bool {
        self.inner.dispatcher.is_available()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.dispatcher.pending_count()
    }

    /// Installs a handler for connection state changes.
    ///
    /// If the connection is still up the handler is immediately invoked with
    /// `Connected`. `Disconnected` is reported once, when the connection is
    /// lost, closed or the client is dropped.
    pub fn set_state_change_handler(
        &self,
        handler: impl Fn(RpcTransportState) + Send + Sync + 'static,
    ) {
        if self.is_available() {
            handler(RpcTransportState::Connected);
        }
        *self.inner.notifier.handler.lock() = Some(Box::new(handler));
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        if self.inner.dispatcher.mark_closing() {
            self.inner.dispatcher.fail_all(|| RpcCallerError::Shutdown);
        }
        self.inner.close.send_replace(true);
        for task in &self.tasks {
            task.abort();
        }
        self.inner.notifier.disconnected();
    }
}

#[async_trait::async_trait]
impl RpcServiceCallerInterface for RpcClient {
    async fn call_rpc<A, R>(
        &self,
        ctx: &mut CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
    ) -> Result<R, RpcCallerError>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        self.call(ctx, service_name, method_name, args).await
    }
}

async fn signalled(rx: &mut watch::Receiver<bool>) {
    // A dropped sender also ends the wait.
    let _ = rx.wait_for(|closed| *closed).await;
}

/// Routes every incoming response to its pending call until the connection
/// ends, then fails whatever is still pending.
async fn read_loop(
    inner: Arc<ClientInner>,
    mut reader: ReadHalf<BoxedStream>,
    max_body_len: usize,
    read_timeout: Option<Duration>,
) {
    let mut close_rx = inner.close.subscribe();

    loop {
        let read = tokio::select! {
            _ = signalled(&mut close_rx) => break,
            read = read_with_timeout(&mut reader, max_body_len, read_timeout) => read,
        };

        match read {
            Ok(message) => {
                inner.dispatcher.handle_response(message);
            }
            Err(err) if err.is_disconnect() => {
                tracing::debug!("Connection to {} ended: {}", inner.peer, err);
                break;
            }
            Err(err) => {
                tracing::warn!("Reading from {} failed: {}", inner.peer, err);
                break;
            }
        }
    }

    inner.dispatcher.mark_shutdown();
    let failed = inner.dispatcher.fail_all(|| RpcCallerError::Shutdown);
    if failed > 0 {
        tracing::debug!("Failed {} pending calls to {}", failed, inner.peer);
    }
    inner.close.send_replace(true);
    inner.notifier.disconnected();
}

async fn read_with_timeout(
    reader: &mut ReadHalf<BoxedStream>,
    max_body_len: usize,
    read_timeout: Option<Duration>,
) -> Result<RpcMessage, FrameDecodeError> {
    match read_timeout {
        Some(limit) => tokio::time::timeout(limit, read_frame(reader, max_body_len))
            .await
            .map_err(|_| FrameDecodeError::Io(io::Error::new(io::ErrorKind::TimedOut, "read timed out")))?,
        None => read_frame(reader, max_body_len).await,
    }
}

/// Owns the write half: frames are written one at a time, in queue order, so
/// an abandoned call can never leave a partial frame on the wire.
async fn write_loop(
    inner: Arc<ClientInner>,
    mut writer: WriteHalf<BoxedStream>,
    mut rx: mpsc::UnboundedReceiver<OutboundCall>,
    write_timeout: Option<Duration>,
) {
    let mut close_rx = inner.close.subscribe();

    loop {
        let outbound = tokio::select! {
            _ = signalled(&mut close_rx) => break,
            next = rx.recv() => match next {
                Some(outbound) => outbound,
                None => break,
            },
        };

        match write_with_timeout(&mut writer, &outbound.frame, write_timeout).await {
            Ok(()) => inner.dispatcher.complete_write(outbound, Ok(())),
            Err(err) => {
                tracing::warn!("Writing to {} failed: {}", inner.peer, err);
                inner.dispatcher.complete_write(outbound, Err(err.into()));
                inner.close.send_replace(true);
                break;
            }
        }
    }

    rx.close();
    while let Ok(outbound) = rx.try_recv() {
        inner
            .dispatcher
            .complete_write(outbound, Err(RpcCallerError::Shutdown));
    }

    if let Err(err) = writer.shutdown().await {
        tracing::debug!("Shutting down connection to {} failed: {}", inner.peer, err);
    }
}

async fn write_with_timeout(
    writer: &mut WriteHalf<BoxedStream>,
    frame: &[u8],
    write_timeout: Option<Duration>,
) -> io::Result<()> {
    match write_timeout {
        Some(limit) => tokio::time::timeout(limit, write_frame(writer, frame))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))?,
        None => write_frame(writer, frame).await,
    }
}

/// Sends a heartbeat every `interval` and expects it echoed within the same
/// interval.
async fn heartbeat_loop(inner: Arc<ClientInner>, interval: Duration) {
    let mut close_rx = inner.close.subscribe();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = signalled(&mut close_rx) => break,
            _ = ticker.tick() => {}
        }
        if !inner.dispatcher.is_available() {
            break;
        }

        let mut ctx = CallContext::new().with_timeout(interval);
        match inner.call::<(), ()>(&mut ctx, "", "", &(), true).await {
            Ok(()) => tracing::trace!("Heartbeat to {} acknowledged", inner.peer),
            Err(err) => tracing::warn!("Heartbeat to {} failed: {}", inner.peer, err),
        }
    }
}
