//! WebSocket-backed event socket with automatic reconnection.
//!
//! # Event Loop
//!
//! [`EventSocket::open`] spawns a tokio task that:
//!
//! - Connects, reads the Engine.IO handshake and joins the default namespace
//! - Answers server pings and enforces the heartbeat deadline
//! - Decodes events (reassembling binary attachments) and fires listeners
//! - Writes queued outbound events in FIFO order
//! - Reconnects after a lost link with a fixed delay and bounded attempts

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{
    EnginePacket, Frames, HandshakeData, OutboundEvent, PacketKind, Payload, SocketPacket,
};
use crate::protocol::message::DEFAULT_NAMESPACE;

use super::{
    Connector, EVENT_CONNECT, EVENT_CONNECT_ERROR, EVENT_DISCONNECT, EVENT_ERROR,
    EVENT_RECONNECT_ATTEMPT, EVENT_RECONNECT_ERROR, EVENT_RECONNECT_FAILED, Emitter,
    SocketOptions, Transport,
};

// ============================================================================
// Constants
// ============================================================================

/// Maximum outbound events waiting to be written before sends are refused.
const MAX_QUEUED_FRAMES: usize = 256;

/// Longest silence tolerated regardless of the server's handshake timings.
const MAX_HEARTBEAT: Duration = Duration::from_secs(24 * 60 * 60);

/// Disconnect reason after [`Transport::close`].
const REASON_CLIENT_DISCONNECT: &str = "io client disconnect";

/// Disconnect reason after the server left the namespace.
const REASON_SERVER_DISCONNECT: &str = "io server disconnect";

/// Disconnect reason after the WebSocket closed.
const REASON_TRANSPORT_CLOSE: &str = "transport close";

/// Disconnect reason after a missed heartbeat.
const REASON_PING_TIMEOUT: &str = "ping timeout";

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type WsWrite = SplitSink<WsStream, Message>;

/// Commands for the socket task.
enum SocketCommand {
    /// Write an encoded event.
    Emit(Frames),
    /// Leave the namespace, close the socket and stop.
    Shutdown,
}

/// Why a connected session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Closed on request.
    Shutdown,
    /// The server disconnected us; not retried.
    ServerDisconnect,
    /// Link lost; retried per policy.
    Lost(String),
}

/// What to do after handling an inbound frame.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Continue,
    Reply(String),
    End(SessionEnd),
}

/// Which task generation holds the link; zero while it is down.
#[derive(Debug, Default)]
struct LinkFlag(AtomicU64);

impl LinkFlag {
    fn is_up(&self) -> bool {
        self.0.load(Ordering::SeqCst) != 0
    }

    fn raise(&self, generation: u64) {
        self.0.store(generation, Ordering::SeqCst);
    }

    /// Lowers the flag if `generation` still holds it.
    fn lower(&self, generation: u64) {
        let _ = self
            .0
            .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// Lowers the link flag when the task ends, including by panic or abort.
struct LinkGuard {
    link: Arc<LinkFlag>,
    generation: u64,
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        self.link.lower(self.generation);
    }
}

/// A binary event waiting for its attachment frames.
struct PendingBinary {
    packet: SocketPacket,
    buffers: Vec<Vec<u8>>,
}

// ============================================================================
// EventSocket
// ============================================================================

/// Socket.IO event socket over a plain WebSocket.
///
/// Created closed; [`Transport::open`] starts the background task.
///
/// # Thread Safety
///
/// `EventSocket` is `Send + Sync`. Listeners run on the socket task.
pub struct EventSocket {
    /// Connection generation.
    id: ConnectionId,
    /// `ws://host:port/socket.io/?EIO=4&transport=websocket`
    endpoint: Url,
    /// Connect and reconnect policy.
    options: SocketOptions,
    /// Listener table (shared with the task).
    emitter: Arc<Emitter>,
    /// Raised while a session is up (shared with the task).
    link: Arc<LinkFlag>,
    /// Last task generation handed out by `open`.
    generations: AtomicU64,
    /// Events queued but not yet written (shared with the task).
    queued: Arc<AtomicUsize>,
    /// Command channel to the running task.
    command_tx: Mutex<Option<mpsc::UnboundedSender<SocketCommand>>>,
    /// Running task, if any.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for EventSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSocket")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint.as_str())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl EventSocket {
    /// Creates a closed socket for `endpoint`.
    #[must_use]
    pub fn new(endpoint: Url, options: SocketOptions) -> Self {
        Self {
            id: ConnectionId::next(),
            endpoint,
            options,
            emitter: Arc::new(Emitter::new()),
            link: Arc::new(LinkFlag::default()),
            generations: AtomicU64::new(0),
            queued: Arc::new(AtomicUsize::new(0)),
            command_tx: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the socket options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SocketOptions {
        &self.options
    }

    /// Returns the number of events queued but not yet written.
    #[inline]
    #[must_use]
    pub fn queued_frames(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

impl Transport for EventSocket {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.link.is_up()
    }

    fn open(&self) -> Result<()> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::runtime(format!("No Tokio runtime to drive the socket: {e}")))?;

        let mut task = self.task.lock();
        if let Some(existing) = task.as_ref()
            && !existing.is_finished()
        {
            if !self.options.force_new {
                debug!(conn = %self.id, "Socket task already running");
                return Ok(());
            }
            debug!(conn = %self.id, "Replacing running socket task");
            existing.abort();
            self.link.clear();
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *self.command_tx.lock() = Some(command_tx);
        self.queued.store(0, Ordering::SeqCst);

        let worker = SocketTask {
            id: self.id,
            generation: self.generations.fetch_add(1, Ordering::SeqCst) + 1,
            endpoint: self.endpoint.clone(),
            options: self.options.clone(),
            emitter: Arc::clone(&self.emitter),
            link: Arc::clone(&self.link),
            queued: Arc::clone(&self.queued),
        };
        *task = Some(runtime.spawn(worker.run(command_rx)));

        debug!(conn = %self.id, endpoint = %self.endpoint, "Socket opening");
        Ok(())
    }

    fn close(&self) {
        self.link.clear();

        match self.command_tx.lock().take() {
            Some(command_tx) => {
                let _ = command_tx.send(SocketCommand::Shutdown);
                debug!(conn = %self.id, "Socket closing");
            }
            None => trace!(conn = %self.id, "Socket already closed"),
        }
    }

    fn emit(&self, event: OutboundEvent) -> Result<()> {
        let name = event.name();

        if !self.is_connected() {
            return Err(Error::not_connected(name));
        }

        let queued = self.queued.load(Ordering::SeqCst);
        if queued >= MAX_QUEUED_FRAMES {
            warn!(
                event = name,
                queued,
                max = MAX_QUEUED_FRAMES,
                "Outbound queue full, dropping event"
            );
            return Err(Error::queue_full(queued, MAX_QUEUED_FRAMES));
        }

        let command_tx = self.command_tx.lock();
        let command_tx = command_tx.as_ref().ok_or(Error::ConnectionClosed)?;

        self.queued.fetch_add(1, Ordering::SeqCst);
        if command_tx
            .send(SocketCommand::Emit(event.into_frames()))
            .is_err()
        {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::ConnectionClosed);
        }

        trace!(conn = %self.id, event = name, "Event queued");
        Ok(())
    }

    fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

impl Drop for EventSocket {
    fn drop(&mut self) {
        let Some(task) = self.task.get_mut().take() else {
            return;
        };

        // After `close` the task finishes its own shutdown and exits.
        if self.command_tx.get_mut().is_some() {
            task.abort();
        }
    }
}

// ============================================================================
// SocketConnector
// ============================================================================

/// Default [`Connector`] producing [`EventSocket`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketConnector;

impl Connector for SocketConnector {
    type Transport = EventSocket;

    fn create(&self, endpoint: &Url, options: &SocketOptions) -> Result<Arc<EventSocket>> {
        if options.secure && !cfg!(feature = "native-tls") {
            return Err(Error::config(
                "wss:// endpoints need the `native-tls` feature",
            ));
        }

        Ok(Arc::new(EventSocket::new(endpoint.clone(), options.clone())))
    }
}

// ============================================================================
// SocketTask
// ============================================================================

/// State owned by the background task.
struct SocketTask {
    id: ConnectionId,
    generation: u64,
    endpoint: Url,
    options: SocketOptions,
    emitter: Arc<Emitter>,
    link: Arc<LinkFlag>,
    queued: Arc<AtomicUsize>,
}

impl SocketTask {
    /// Connect / session / reconnect loop.
    async fn run(self, mut command_rx: mpsc::UnboundedReceiver<SocketCommand>) {
        let _link = LinkGuard {
            link: Arc::clone(&self.link),
            generation: self.generation,
        };
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                info!(conn = %self.id, attempt, "Reconnecting to the server");
                self.emitter
                    .emit(EVENT_RECONNECT_ATTEMPT, &Payload::new(vec![json!(attempt)]));
            }

            let Some(result) = self.connect_once(&mut command_rx).await else {
                debug!(conn = %self.id, "Shutdown while connecting");
                break;
            };

            match result {
                Ok((ws, handshake)) => {
                    attempt = 0;
                    self.link.raise(self.generation);
                    info!(conn = %self.id, endpoint = %self.endpoint, sid = %handshake.sid, "Connected");
                    self.emitter.emit(EVENT_CONNECT, &Payload::empty());

                    let end = self.run_session(ws, &handshake, &mut command_rx).await;
                    self.link.lower(self.generation);

                    match end {
                        SessionEnd::Shutdown => {
                            self.emit_disconnect(REASON_CLIENT_DISCONNECT);
                            break;
                        }
                        SessionEnd::ServerDisconnect => {
                            self.emit_disconnect(REASON_SERVER_DISCONNECT);
                            break;
                        }
                        SessionEnd::Lost(reason) => self.emit_disconnect(&reason),
                    }
                }
                Err(e) => {
                    warn!(conn = %self.id, attempt, error = %e, "Connection attempt failed");
                    if e.is_timeout() {
                        self.emitter.emit(EVENT_ERROR, &Payload::text("timeout"));
                    }
                    let event = if attempt == 0 {
                        EVENT_CONNECT_ERROR
                    } else {
                        EVENT_RECONNECT_ERROR
                    };
                    self.emitter.emit(event, &Payload::text(e.to_string()));
                }
            }

            if !self.options.reconnection {
                debug!(conn = %self.id, "Reconnection disabled, stopping");
                break;
            }

            if attempt >= self.options.reconnection_attempts {
                let e = Error::reconnect_exhausted(attempt);
                error!(conn = %self.id, error = %e, "Giving up on the server");
                self.emitter
                    .emit(EVENT_RECONNECT_FAILED, &Payload::text(e.to_string()));
                break;
            }

            attempt += 1;
            if !self.wait_before_retry(&mut command_rx).await {
                debug!(conn = %self.id, "Shutdown during reconnect delay");
                break;
            }
        }

        debug!(conn = %self.id, "Socket task terminated");
    }

    /// Runs one handshake, bounded by the handshake timeout.
    ///
    /// Returns `None` if a shutdown arrives first.
    async fn connect_once(
        &self,
        command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
    ) -> Option<Result<(WsStream, HandshakeData)>> {
        let timeout_ms = self.options.timeout.as_millis() as u64;
        let attempt = timeout(self.options.timeout, handshake(&self.endpoint));
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => {
                    return Some(result.unwrap_or_else(|_| Err(Error::connection_timeout(timeout_ms))));
                }

                command = command_rx.recv() => match command {
                    Some(SocketCommand::Emit(_)) => {
                        self.queued.fetch_sub(1, Ordering::SeqCst);
                        debug!(conn = %self.id, "Dropping event queued while connecting");
                    }
                    Some(SocketCommand::Shutdown) | None => return None,
                }
            }
        }
    }

    /// Waits the reconnection delay. Returns `false` on shutdown.
    async fn wait_before_retry(
        &self,
        command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
    ) -> bool {
        let delay = sleep(self.options.reconnection_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                () = &mut delay => return true,

                command = command_rx.recv() => match command {
                    Some(SocketCommand::Emit(_)) => {
                        self.queued.fetch_sub(1, Ordering::SeqCst);
                        debug!(conn = %self.id, "Dropping event queued while disconnected");
                    }
                    Some(SocketCommand::Shutdown) | None => return false,
                }
            }
        }
    }

    /// Pumps one connected session until it ends.
    async fn run_session(
        &self,
        ws: WsStream,
        handshake: &HandshakeData,
        command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
    ) -> SessionEnd {
        let (mut ws_write, mut ws_read) = ws.split();
        let heartbeat = handshake.heartbeat_deadline();
        let mut deadline = deadline_after(heartbeat);
        let mut pending: Option<PendingBinary> = None;

        loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    deadline = deadline_after(heartbeat);

                    let inbound = match message {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text, &mut pending),
                        Some(Ok(Message::Binary(data))) => {
                            self.handle_binary(data.to_vec(), &mut pending);
                            Inbound::Continue
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(conn = %self.id, "WebSocket closed by remote");
                            Inbound::End(SessionEnd::Lost(REASON_TRANSPORT_CLOSE.to_string()))
                        }
                        Some(Err(e)) => {
                            error!(conn = %self.id, error = %e, "WebSocket error");
                            Inbound::End(SessionEnd::Lost(format!("transport error: {e}")))
                        }
                        // Ping/Pong are answered by tungstenite
                        Some(Ok(_)) => Inbound::Continue,
                    };

                    match inbound {
                        Inbound::Continue => {}
                        Inbound::Reply(text) => {
                            if let Err(e) = ws_write.send(Message::text(text)).await {
                                warn!(conn = %self.id, error = %e, "Failed to answer ping");
                                return SessionEnd::Lost(format!("transport error: {e}"));
                            }
                        }
                        Inbound::End(end) => return end,
                    }
                }

                // Outbound events from the API
                command = command_rx.recv() => match command {
                    Some(SocketCommand::Emit(frames)) => {
                        self.queued.fetch_sub(1, Ordering::SeqCst);
                        if let Err(e) = write_frames(&mut ws_write, frames).await {
                            warn!(conn = %self.id, error = %e, "Failed to write event");
                            return SessionEnd::Lost(format!("transport error: {e}"));
                        }
                    }

                    Some(SocketCommand::Shutdown) | None => {
                        let leave = SocketPacket::disconnect().to_engine_text();
                        let _ = ws_write.send(Message::text(leave)).await;
                        let _ = ws_write.close().await;
                        return SessionEnd::Shutdown;
                    }
                },

                // Heartbeat
                () = sleep_until(deadline) => {
                    warn!(conn = %self.id, timeout_ms = heartbeat.as_millis() as u64, "No ping from server");
                    return SessionEnd::Lost(REASON_PING_TIMEOUT.to_string());
                }
            }
        }
    }

    /// Handles a text frame.
    fn handle_text(&self, text: &str, pending: &mut Option<PendingBinary>) -> Inbound {
        let packet = match EnginePacket::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                self.report_error(&e);
                return Inbound::Continue;
            }
        };

        match packet {
            EnginePacket::Ping(data) => Inbound::Reply(EnginePacket::Pong(data).encode()),
            EnginePacket::Close => Inbound::End(SessionEnd::Lost(REASON_TRANSPORT_CLOSE.to_string())),
            EnginePacket::Message(body) => self.handle_message(&body, pending),
            other => {
                trace!(conn = %self.id, ?other, "Ignoring Engine.IO packet");
                Inbound::Continue
            }
        }
    }

    /// Handles the Socket.IO packet inside an Engine.IO message.
    fn handle_message(&self, body: &str, pending: &mut Option<PendingBinary>) -> Inbound {
        let packet = match SocketPacket::decode(body) {
            Ok(packet) => packet,
            Err(e) => {
                self.report_error(&e);
                return Inbound::Continue;
            }
        };

        if packet.namespace != DEFAULT_NAMESPACE {
            trace!(conn = %self.id, namespace = %packet.namespace, "Ignoring foreign namespace");
            return Inbound::Continue;
        }

        match packet.kind {
            PacketKind::Event => self.dispatch(packet, Vec::new()),
            PacketKind::BinaryEvent if packet.attachments == 0 => self.dispatch(packet, Vec::new()),
            PacketKind::BinaryEvent => {
                if pending.is_some() {
                    warn!(conn = %self.id, "Binary event superseded before its attachments arrived");
                }
                let buffers = Vec::with_capacity(packet.attachments);
                *pending = Some(PendingBinary { packet, buffers });
            }
            PacketKind::Disconnect => {
                info!(conn = %self.id, "Server closed the session");
                return Inbound::End(SessionEnd::ServerDisconnect);
            }
            PacketKind::ConnectError => {
                let reason = packet.data.map(|d| d.to_string()).unwrap_or_default();
                warn!(conn = %self.id, reason = %reason, "Namespace error");
                return Inbound::End(SessionEnd::Lost(format!("namespace error: {reason}")));
            }
            PacketKind::Connect | PacketKind::Ack | PacketKind::BinaryAck => {
                trace!(conn = %self.id, kind = ?packet.kind, "Ignoring Socket.IO packet");
            }
        }

        Inbound::Continue
    }

    /// Collects an attachment for the pending binary event.
    fn handle_binary(&self, data: Vec<u8>, pending: &mut Option<PendingBinary>) {
        let Some(mut binary) = pending.take() else {
            warn!(conn = %self.id, bytes = data.len(), "Binary frame without a pending event");
            return;
        };

        binary.buffers.push(data);
        if binary.buffers.len() < binary.packet.attachments {
            *pending = Some(binary);
            return;
        }

        self.dispatch(binary.packet, binary.buffers);
    }

    /// Fires listeners for a complete event packet.
    fn dispatch(&self, packet: SocketPacket, attachments: Vec<Vec<u8>>) {
        match packet.into_event(attachments) {
            Ok((name, payload)) => {
                trace!(conn = %self.id, event = %name, "Event received");
                if self.emitter.emit(&name, &payload) == 0 {
                    debug!(conn = %self.id, event = %name, "Unhandled event");
                }
            }
            Err(e) => self.report_error(&e),
        }
    }

    fn report_error(&self, e: &Error) {
        warn!(conn = %self.id, error = %e, "Dropping undecodable frame");
        self.emitter.emit(EVENT_ERROR, &Payload::text(e.to_string()));
    }

    fn emit_disconnect(&self, reason: &str) {
        info!(conn = %self.id, reason, "Disconnected");
        self.emitter.emit(EVENT_DISCONNECT, &Payload::text(reason));
    }
}

// ============================================================================
// Wire Helpers
// ============================================================================

/// Returns the instant `heartbeat` from now, capped at [`MAX_HEARTBEAT`].
fn deadline_after(heartbeat: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(heartbeat.min(MAX_HEARTBEAT)).unwrap_or(now)
}

/// Opens the WebSocket and completes the Engine.IO and namespace handshakes.
async fn handshake(endpoint: &Url) -> Result<(WsStream, HandshakeData)> {
    let (mut ws, _response) = connect_async(endpoint.as_str()).await?;

    let handshake = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => match EnginePacket::decode(&text)? {
                EnginePacket::Open(handshake) => break handshake,
                other => {
                    return Err(Error::protocol(format!(
                        "Expected Engine.IO open packet, got {other:?}"
                    )));
                }
            },
            Some(Ok(Message::Close(_))) | None => return Err(Error::ConnectionClosed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    };

    debug!(
        sid = %handshake.sid,
        ping_interval = handshake.ping_interval,
        ping_timeout = handshake.ping_timeout,
        "Engine.IO session opened"
    );

    ws.send(Message::text(SocketPacket::connect().to_engine_text()))
        .await?;

    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => match EnginePacket::decode(&text)? {
                EnginePacket::Message(body) => {
                    let packet = SocketPacket::decode(&body)?;
                    match packet.kind {
                        PacketKind::Connect => break,
                        PacketKind::ConnectError => {
                            let reason = packet.data.map(|d| d.to_string()).unwrap_or_default();
                            return Err(Error::connection(format!(
                                "Namespace connect refused: {reason}"
                            )));
                        }
                        kind => trace!(?kind, "Packet before namespace connect"),
                    }
                }
                EnginePacket::Ping(data) => {
                    ws.send(Message::text(EnginePacket::Pong(data).encode()))
                        .await?;
                }
                EnginePacket::Close => return Err(Error::ConnectionClosed),
                _ => {}
            },
            Some(Ok(Message::Close(_))) | None => return Err(Error::ConnectionClosed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }

    Ok((ws, handshake))
}

/// Writes an event's text frame followed by its attachments.
async fn write_frames(ws_write: &mut WsWrite, frames: Frames) -> Result<()> {
    let bytes = frames.len();

    ws_write.send(Message::text(frames.text)).await?;
    for buffer in frames.binary {
        ws_write.send(Message::binary(buffer)).await?;
    }

    trace!(bytes, "Event written");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
