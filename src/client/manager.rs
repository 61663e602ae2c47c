//! Connection manager.
//!
//! Owns the single connection to the processing server, its lifecycle and
//! authentication handshake, and the outward API used by the app.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use framecast::ConnectionManager;
//!
//! let (manager, dispatcher) = ConnectionManager::new();
//! manager.register_consumer(Arc::new(MyConsumer));
//! manager.initialize("alice", "pw", "127.0.0.1", 9000)?;
//! manager.connect()?;
//! tokio::spawn(dispatcher.run());
//!
//! manager.send_image(jpeg_bytes)?;
//! manager.disconnect()?;
//! ```
//!
//! # Operations
//!
//! | Operation | Precondition | Effect |
//! |-----------|--------------|--------|
//! | `initialize` | none | tear down old connection, create a new one |
//! | `connect` | initialized, not connected, username set | register listeners, open |
//! | `disconnect` | a connection exists | close, unregister, discard |
//! | `send_*`, control events | connected | single emission |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::frame::{FrameKind, MediaFrame};
use crate::identifiers::ConnectionId;
use crate::protocol::OutboundEvent;
use crate::transport::{Connector, SocketConnector, SocketOptions, Transport};

use super::config::{FrameRetryPolicy, SessionConfig};
use super::consumer::{ConsumerSlot, DeliverySender, Dispatcher, ResultConsumer};
use super::handlers::{
    HandlerState, Registrations, register_all, unregister_all, unregister_for_close,
};

// ============================================================================
// Connection
// ============================================================================

/// The live transport plus the listeners registered on it.
struct Connection<T> {
    transport: Arc<T>,
    handlers: Arc<HandlerState>,
    registrations: Registrations,
}

impl<T: Transport> Connection<T> {
    /// Closes the transport and removes the listener set.
    ///
    /// The `disconnect` listener outlives the connection so a requested
    /// close is reported like a lost one.
    fn teardown(mut self) {
        let id = self.transport.id();
        unregister_for_close(self.transport.emitter(), &mut self.registrations);
        self.transport.close();
        debug!(conn = %id, "Connection torn down");
    }
}

/// Mutable manager state.
struct ManagerState<T> {
    config: Option<SessionConfig>,
    connection: Option<Connection<T>>,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Client for the processing server.
///
/// Created with [`ConnectionManager::new`], which also returns the
/// [`Dispatcher`] that delivers results to the registered consumer.
///
/// # Thread Safety
///
/// All methods take `&self`; share the manager with `Arc`.
pub struct ConnectionManager<C: Connector = SocketConnector> {
    connector: C,
    options: SocketOptions,
    retry: FrameRetryPolicy,
    state: Mutex<ManagerState<C::Transport>>,
    consumer: ConsumerSlot,
    deliveries: DeliverySender,
}

impl<C: Connector + fmt::Debug> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConnectionManager")
            .field("connector", &self.connector)
            .field("config", &state.config)
            .field(
                "connection",
                &state.connection.as_ref().map(|c| c.transport.id()),
            )
            .field("consumer", &self.consumer)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionManager<SocketConnector> {
    /// Creates a manager using the WebSocket transport.
    #[must_use]
    pub fn new() -> (Self, Dispatcher) {
        Self::with_connector(SocketConnector)
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager using `connector` for transports.
    #[must_use]
    pub fn with_connector(connector: C) -> (Self, Dispatcher) {
        let (deliveries, rx) = mpsc::unbounded_channel();
        let consumer = ConsumerSlot::default();
        let dispatcher = Dispatcher::new(rx, consumer.clone());

        let manager = Self {
            connector,
            options: SocketOptions::default(),
            retry: FrameRetryPolicy::default(),
            state: Mutex::new(ManagerState {
                config: None,
                connection: None,
            }),
            consumer,
            deliveries,
        };

        (manager, dispatcher)
    }

    /// Sets the socket options used by later `initialize` calls.
    #[must_use]
    pub fn with_options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets how often video frames re-check a dropped link.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: FrameRetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

impl<C: Connector> ConnectionManager<C> {
    /// Stores the session and creates a fresh, unopened connection.
    ///
    /// Any previous connection is torn down first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if `host` and `port` do not form
    /// an endpoint. The configuration is kept and no connection exists.
    pub fn initialize(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Result<()> {
        let config = SessionConfig::new(username, password, host, port);
        let mut state = self.state.lock();

        if let Some(previous) = state.connection.take() {
            info!("Replacing existing connection");
            previous.teardown();
        }
        state.config = Some(config.clone());

        let transport = config
            .endpoint(&self.options)
            .and_then(|endpoint| self.connector.create(&endpoint, &self.options))
            .inspect_err(|e| error!(error = %e, "Failed to create connection"))?;

        let weak: Weak<dyn Transport> = {
            let shared: Arc<dyn Transport> = transport.clone();
            Arc::downgrade(&shared)
        };
        let handlers = Arc::new(HandlerState {
            config,
            transport: weak,
            deliveries: self.deliveries.clone(),
            consumer: self.consumer.clone(),
        });

        info!(
            conn = %transport.id(),
            address = %handlers.config.address(),
            "Connection initialized"
        );
        state.connection = Some(Connection {
            transport,
            handlers,
            registrations: Registrations::new(),
        });

        Ok(())
    }

    /// Registers the listener set and starts connecting.
    ///
    /// Returns once the open request is issued; the result arrives as a
    /// `Connected` delivery.
    ///
    /// # Errors
    ///
    /// Checked in this order, each leaving the transport untouched:
    ///
    /// - [`Error::NotInitialized`] without a connection
    /// - [`Error::AlreadyConnected`] if the connection is open
    /// - [`Error::MissingCredentials`] if no username is set
    pub fn connect(&self) -> Result<()> {
        let mut state = self.state.lock();

        let Some(connection) = state.connection.as_mut() else {
            warn!("Cannot connect, connection is not initialized");
            return Err(Error::NotInitialized);
        };

        if connection.transport.is_connected() {
            warn!(conn = %connection.transport.id(), "Already connected to server");
            return Err(Error::AlreadyConnected);
        }

        if !connection.handlers.config.has_credentials() {
            warn!("Cannot connect, username is not defined");
            return Err(Error::MissingCredentials);
        }

        let emitter = connection.transport.emitter();
        unregister_all(emitter, &mut connection.registrations);
        connection.registrations = register_all(emitter, &connection.handlers);

        connection.transport.open()?;
        info!(
            conn = %connection.transport.id(),
            address = %connection.handlers.config.address(),
            "Connecting to server"
        );
        Ok(())
    }

    /// Closes and discards the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConnection`] if there is nothing to disconnect.
    pub fn disconnect(&self) -> Result<()> {
        let Some(connection) = self.state.lock().connection.take() else {
            debug!("Disconnect requested, connection already gone");
            return Err(Error::NoConnection);
        };

        info!(conn = %connection.transport.id(), "Disconnecting");
        connection.teardown();
        Ok(())
    }
}

// ============================================================================
// Sending
// ============================================================================

impl<C: Connector> ConnectionManager<C> {
    /// Sends a still frame for recognition.
    ///
    /// The answer arrives as a `Response` delivery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the link is down. Nothing is
    /// buffered.
    pub fn send_image(&self, image: Vec<u8>) -> Result<()> {
        self.emit_if_connected("send image", OutboundEvent::receive_image(image))
    }

    /// Sends one video frame, re-checking a dropped link a few times.
    ///
    /// Connectivity is checked up to [`FrameRetryPolicy::attempts`] times
    /// without sleeping between checks.
    /// `sequence` is passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if every check failed.
    pub fn send_video_frame(&self, frame: Vec<u8>, sequence: u32) -> Result<()> {
        let attempts = self.retry.attempts.max(1);

        for attempt in 1..=attempts {
            if let Some(transport) = self.connected_transport() {
                return transport
                    .emit(OutboundEvent::receive_video_stream(frame, sequence))
                    .inspect_err(|e| warn!(sequence, error = %e, "Failed to send video frame"));
            }

            debug!(sequence, attempt, "Waiting for client to reconnect");
        }

        warn!(sequence, attempts, "Dropping video frame, not connected");
        Err(Error::not_connected("send video frame"))
    }

    /// Sends a [`MediaFrame`] as an image or video frame.
    ///
    /// # Errors
    ///
    /// As [`send_image`](Self::send_image) or
    /// [`send_video_frame`](Self::send_video_frame).
    pub fn send_frame(&self, frame: MediaFrame) -> Result<()> {
        match frame.kind {
            FrameKind::Image => self.send_image(frame.bytes),
            FrameKind::Video { sequence } => self.send_video_frame(frame.bytes, sequence),
        }
    }

    /// Asks the server to process the streamed video.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the link is down.
    pub fn start_transcript_processing(&self) -> Result<()> {
        self.emit_if_connected("start transcript processing", OutboundEvent::ProcessVideo)
    }

    /// Asks for the current transcript.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the link is down.
    pub fn check_transcript(&self) -> Result<()> {
        self.emit_if_connected("check transcript", OutboundEvent::check_transcript())
    }

    /// Stops recording and asks for a prediction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the link is down.
    pub fn get_prediction(&self) -> Result<()> {
        self.emit_if_connected("get prediction", OutboundEvent::stop_record())
    }

    fn emit_if_connected(&self, operation: &'static str, event: OutboundEvent) -> Result<()> {
        let Some(transport) = self.connected_transport() else {
            warn!(operation, "Not connected, dropping request");
            return Err(Error::not_connected(operation));
        };

        transport
            .emit(event)
            .inspect_err(|e| warn!(operation, error = %e, "Failed to send"))
    }

    /// Returns the transport if it is connected.
    ///
    /// The lock is released before the caller emits.
    fn connected_transport(&self) -> Option<Arc<C::Transport>> {
        let state = self.state.lock();
        state
            .connection
            .as_ref()
            .filter(|c| c.transport.is_connected())
            .map(|c| Arc::clone(&c.transport))
    }
}

// ============================================================================
// Consumer & Accessors
// ============================================================================

impl<C: Connector> ConnectionManager<C> {
    /// Registers the result consumer, replacing any previous one.
    pub fn register_consumer(&self, consumer: Arc<dyn ResultConsumer>) {
        if self.consumer.set(consumer) {
            debug!("Result consumer replaced");
        } else {
            debug!("Result consumer registered");
        }
    }

    /// Clears the result consumer. Returns `false` if none was set.
    pub fn unregister_consumer(&self) -> bool {
        let removed = self.consumer.clear();
        debug!(removed, "Result consumer unregistered");
        removed
    }

    /// Returns `true` if a consumer is registered.
    #[inline]
    #[must_use]
    pub fn has_consumer(&self) -> bool {
        self.consumer.is_set()
    }

    /// Returns `true` if the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected_transport().is_some()
    }

    /// Returns `true` if a connection object exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().connection.is_some()
    }

    /// Returns the id of the current connection.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.state
            .lock()
            .connection
            .as_ref()
            .map(|c| c.transport.id())
    }

    /// Returns the stored session configuration.
    #[must_use]
    pub fn config(&self) -> Option<SessionConfig> {
        self.state.lock().config.clone()
    }

    /// Returns the socket options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SocketOptions {
        &self.options
    }

    /// Returns the video frame retry policy.
    #[inline]
    #[must_use]
    pub fn retry_policy(&self) -> FrameRetryPolicy {
        self.retry
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.state.get_mut().connection.take() {
            connection.teardown();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use crate::client::consumer::tests::RecordingConsumer;
    use crate::protocol::Payload;
    use crate::transport::mock::{MockConnector, MockTransport};

    fn manager() -> (ConnectionManager<MockConnector>, Dispatcher, MockConnector) {
        let connector = MockConnector::default();
        let (manager, dispatcher) = ConnectionManager::with_connector(connector.clone());
        (manager, dispatcher, connector)
    }

    fn connected() -> (
        ConnectionManager<MockConnector>,
        Dispatcher,
        Arc<MockTransport>,
    ) {
        let (manager, dispatcher, connector) = manager();
        manager
            .initialize("alice", "pw", "127.0.0.1", 9000)
            .expect("initialize");
        manager.connect().expect("connect");
        let transport = connector.last().expect("transport created");
        transport.simulate_connect();
        (manager, dispatcher, transport)
    }

    fn authenticate(username: &str, password: &str) -> OutboundEvent {
        OutboundEvent::authenticate(username, password)
    }

    #[test]
    fn test_initialize_creates_unopened_connection() {
        let (manager, _dispatcher, connector) = manager();
        manager
            .initialize("alice", "pw", "127.0.0.1", 9000)
            .expect("initialize");

        let transport = connector.last().expect("transport created");
        assert_eq!(
            transport.endpoint.as_str(),
            "ws://127.0.0.1:9000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(transport.opens(), 0);
        assert!(manager.is_initialized());
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_reinitialize_tears_down_previous() {
        let (manager, _dispatcher, connector) = manager();
        manager.initialize("a", "pw", "h1", 1).expect("initialize");
        manager.connect().expect("connect");
        let first = connector.last().expect("first");

        manager.initialize("b", "pw", "h2", 2).expect("initialize");
        let second = connector.last().expect("second");

        assert_eq!(first.closes(), 1);
        assert_eq!(first.emitter().listener_count("connect"), 0);
        assert_eq!(first.emitter().listener_count("disconnect"), 1);
        assert_eq!(second.closes(), 0);
        assert_eq!(connector.created(), 2);
        assert_eq!(manager.connection_id(), Some(second.id()));
        assert_eq!(manager.config().map(|c| c.username), Some("b".to_string()));
    }

    #[test]
    fn test_initialize_invalid_address_keeps_manager_usable() {
        let (manager, _dispatcher, connector) = manager();
        let result = manager.initialize("alice", "pw", "bad host", 9000);

        assert!(matches!(result, Err(Error::InvalidAddress { .. })));
        assert_eq!(connector.created(), 0);
        assert!(!manager.is_initialized());
        assert_eq!(manager.config().map(|c| c.host), Some("bad host".to_string()));
        assert!(matches!(manager.connect(), Err(Error::NotInitialized)));

        manager
            .initialize("alice", "pw", "127.0.0.1", 9000)
            .expect("recovers");
        assert!(manager.is_initialized());
    }

    #[test]
    fn test_connector_failure_is_reported() {
        let (manager, _dispatcher, connector) = manager();
        connector.fail_next(true);
        let result = manager.initialize("alice", "pw", "127.0.0.1", 9000);
        assert!(matches!(result, Err(Error::Config { .. })));
        assert!(!manager.is_initialized());
    }

    #[test]
    fn test_connect_without_initialize() {
        let (manager, _dispatcher, connector) = manager();
        assert!(matches!(manager.connect(), Err(Error::NotInitialized)));
        assert_eq!(connector.created(), 0);
    }

    #[test]
    fn test_connect_while_connected_is_noop() {
        let (manager, _dispatcher, transport) = connected();
        let listeners = transport.emitter().listener_count("connect");

        assert!(matches!(manager.connect(), Err(Error::AlreadyConnected)));
        assert_eq!(transport.opens(), 1);
        assert_eq!(transport.emitter().listener_count("connect"), listeners);
    }

    #[test]
    fn test_connect_without_username() {
        let (manager, _dispatcher, connector) = manager();
        manager.initialize("", "pw", "127.0.0.1", 9000).expect("initialize");

        assert!(matches!(manager.connect(), Err(Error::MissingCredentials)));
        let transport = connector.last().expect("transport");
        assert_eq!(transport.opens(), 0);
        assert!(transport.emitter().is_empty());
    }

    #[test]
    fn test_reconnect_call_does_not_duplicate_listeners() {
        let (manager, _dispatcher, connector) = manager();
        manager.initialize("alice", "pw", "h", 1).expect("initialize");
        manager.connect().expect("connect");
        manager.connect().expect("connect again while still opening");

        let transport = connector.last().expect("transport");
        assert_eq!(transport.opens(), 2);
        assert_eq!(transport.emitter().listener_count("connect"), 1);
        assert_eq!(transport.emitter().listener_count("error"), 2);
    }

    #[test]
    fn test_connect_event_emits_single_authenticate() {
        let (_manager, _dispatcher, transport) = connected();
        assert_eq!(transport.emitted(), vec![authenticate("alice", "pw")]);
    }

    #[test]
    fn test_authenticate_uses_current_credentials() {
        let (manager, _dispatcher, connector) = manager();
        manager.initialize("old", "1", "h", 1).expect("initialize");
        manager.initialize("new", "2", "h", 1).expect("initialize");
        manager.connect().expect("connect");

        let transport = connector.last().expect("transport");
        transport.simulate_connect();
        assert_eq!(transport.emitted(), vec![authenticate("new", "2")]);
    }

    #[test]
    fn test_login_flow_reaches_consumer_once() {
        let (manager, mut dispatcher, connector) = manager();
        let consumer = Arc::new(RecordingConsumer::default());
        manager.register_consumer(consumer.clone());

        manager
            .initialize("alice", "pw", "127.0.0.1", 9000)
            .expect("initialize");
        manager.connect().expect("connect");
        let transport = connector.last().expect("transport");
        transport.simulate_connect();
        assert_eq!(transport.emitted(), vec![authenticate("alice", "pw")]);

        transport.fire("onAuthentication", Payload::new(vec![json!(true)]));
        assert!(consumer.calls().is_empty(), "only the dispatcher calls the consumer");

        assert_eq!(dispatcher.dispatch_pending(), 1);
        assert_eq!(consumer.calls(), ["connected:true"]);
    }

    #[test]
    fn test_second_consumer_replaces_first() {
        let (manager, mut dispatcher, transport) = connected();
        let first = Arc::new(RecordingConsumer::default());
        let second = Arc::new(RecordingConsumer::default());

        manager.register_consumer(first.clone());
        transport.fire("onTranscriptGenerated", Payload::text("one"));
        dispatcher.dispatch_pending();

        manager.register_consumer(second.clone());
        transport.fire("onTranscriptGenerated", Payload::text("two"));
        dispatcher.dispatch_pending();

        assert_eq!(first.calls(), ["transcript:one"]);
        assert_eq!(second.calls(), ["transcript:two"]);
    }

    #[test]
    fn test_results_without_consumer_are_not_held() {
        let (manager, mut dispatcher, transport) = connected();
        transport.fire("onAuthentication", Payload::new(vec![json!(true)]));

        let consumer = Arc::new(RecordingConsumer::default());
        manager.register_consumer(consumer.clone());
        dispatcher.dispatch_pending();

        assert!(consumer.calls().is_empty());
        assert!(manager.unregister_consumer());
        assert!(!manager.has_consumer());
    }

    #[test]
    fn test_response_missing_is_gloss_defaults_false() {
        let (manager, mut dispatcher, transport) = connected();
        let consumer = Arc::new(RecordingConsumer::default());
        manager.register_consumer(consumer.clone());

        transport.fire("onResponse", Payload::new(vec![json!({"result": "HELLO"})]));
        dispatcher.dispatch_pending();

        assert_eq!(consumer.calls(), ["response:HELLO:false"]);
    }

    #[test]
    fn test_send_image_while_disconnected() {
        let (manager, _dispatcher, connector) = manager();
        assert!(matches!(
            manager.send_image(vec![1, 2, 3]),
            Err(Error::NotConnected { .. })
        ));

        manager.initialize("alice", "pw", "h", 1).expect("initialize");
        let result = manager.send_image(vec![1, 2, 3]);
        assert!(matches!(result, Err(Error::NotConnected { operation: "send image" })));
        assert!(connector.last().expect("transport").emitted().is_empty());
    }

    #[test]
    fn test_send_image_when_connected() {
        let (manager, _dispatcher, transport) = connected();
        assert_ok!(manager.send_image(vec![9, 9]));
        assert_eq!(
            transport.emitted().last(),
            Some(&OutboundEvent::receive_image(vec![9, 9]))
        );
    }

    #[test]
    fn test_send_video_frame_checks_at_most_five_times() {
        let (manager, _dispatcher, connector) = manager();
        manager.initialize("alice", "pw", "h", 1).expect("initialize");
        let transport = connector.last().expect("transport");

        let result = manager.send_video_frame(vec![0; 4], 7);
        assert!(matches!(result, Err(Error::NotConnected { .. })));
        assert_eq!(transport.checks(), 5);
        assert!(transport.emitted().is_empty());
    }

    #[test]
    fn test_send_video_frame_respects_retry_policy() {
        let connector = MockConnector::default();
        let (manager, _dispatcher) = ConnectionManager::with_connector(connector.clone());
        let manager = manager.with_retry_policy(FrameRetryPolicy::no_retry());
        manager.initialize("alice", "pw", "h", 1).expect("initialize");

        assert_err!(manager.send_video_frame(vec![1], 1));
        assert_eq!(connector.last().expect("transport").checks(), 1);
    }

    #[test]
    fn test_send_video_frame_never_sleeps() {
        let connector = MockConnector::default();
        let (manager, _dispatcher) = ConnectionManager::with_connector(connector.clone());
        let manager = manager.with_retry_policy(FrameRetryPolicy::new(10_000));
        manager.initialize("alice", "pw", "h", 1).expect("initialize");

        let started = std::time::Instant::now();
        assert_err!(manager.send_video_frame(vec![1], 1));
        assert_eq!(connector.last().expect("transport").checks(), 10_000);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_send_video_frame_passes_sequence_through() {
        let (manager, _dispatcher, transport) = connected();
        manager.send_video_frame(vec![5], 42).expect("send");
        assert_eq!(
            transport.emitted().last(),
            Some(&OutboundEvent::receive_video_stream(vec![5], 42))
        );
    }

    #[test]
    fn test_send_frame_routes_by_kind() {
        let (manager, _dispatcher, transport) = connected();
        assert_ok!(manager.send_frame(MediaFrame::image(vec![1])));
        assert_ok!(manager.send_frame(MediaFrame::video(vec![2], 5)));

        let names: Vec<&str> = transport.emitted().iter().map(OutboundEvent::name).collect();
        assert_eq!(names, ["authenticate", "receiveImage", "receiveVideoStream"]);
    }

    #[test]
    fn test_transport_errors_propagate() {
        let (manager, _dispatcher, transport) = connected();
        transport
            .fail_emits
            .store(1, std::sync::atomic::Ordering::SeqCst);
        assert!(matches!(
            manager.send_image(vec![1]),
            Err(Error::QueueFull { .. })
        ));
        manager.send_image(vec![1]).expect("next send succeeds");
    }

    #[test]
    fn test_control_events() {
        let (manager, _dispatcher, transport) = connected();
        assert_ok!(manager.start_transcript_processing());
        assert_ok!(manager.check_transcript());
        assert_ok!(manager.get_prediction());

        let names: Vec<&str> = transport.emitted().iter().map(OutboundEvent::name).collect();
        assert_eq!(
            names,
            ["authenticate", "processVideo", "checkTranscript", "stopRecord"]
        );
    }

    #[test]
    fn test_control_events_while_disconnected() {
        let (manager, _dispatcher, transport) = connected();
        transport.simulate_disconnect("transport close");

        assert!(matches!(
            manager.start_transcript_processing(),
            Err(Error::NotConnected { operation: "start transcript processing" })
        ));
        assert_err!(manager.check_transcript());
        assert_err!(manager.get_prediction());
        assert_eq!(transport.emitted().len(), 1);
    }

    #[test]
    fn test_disconnect_twice() {
        let (manager, _dispatcher, transport) = connected();

        manager.disconnect().expect("first disconnect");
        assert!(matches!(manager.disconnect(), Err(Error::NoConnection)));

        assert_eq!(transport.closes(), 1);
        assert_eq!(transport.emitter().listener_count("connect"), 0);
        assert_eq!(transport.fire("disconnect", Payload::text("io client disconnect")), 1);
        assert!(!manager.is_initialized());
        assert!(matches!(manager.connect(), Err(Error::NotInitialized)));
    }

    #[test]
    fn test_reconnect_failed_delivers_disconnected() {
        let (manager, mut dispatcher, transport) = connected();
        let consumer = Arc::new(RecordingConsumer::default());
        manager.register_consumer(consumer.clone());

        transport.simulate_disconnect("ping timeout");
        transport.fire("reconnect_failed", Payload::text("gave up"));
        dispatcher.dispatch_pending();

        assert_eq!(consumer.calls(), ["connected:false"]);
    }

    #[test]
    fn test_reconnect_reauthenticates() {
        let (_manager, _dispatcher, transport) = connected();
        transport.simulate_disconnect("transport close");
        transport.simulate_connect();
        assert_eq!(
            transport.emitted(),
            vec![authenticate("alice", "pw"), authenticate("alice", "pw")]
        );
    }

    #[test]
    fn test_drop_closes_connection() {
        let (manager, _dispatcher, transport) = connected();
        drop(manager);
        assert_eq!(transport.closes(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_namespace_over_socket() {
        use std::time::Duration;

        use futures_util::{SinkExt, StreamExt};
        use tokio::net::TcpListener;
        use tokio::sync::oneshot;
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let (authenticated_tx, authenticated_rx) = oneshot::channel();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("upgrade");
            let mut received = Vec::new();
            let mut authenticated_tx = Some(authenticated_tx);

            ws.send(Message::text(r#"0{"sid":"s1","pingInterval":25000,"pingTimeout":20000}"#))
                .await
                .expect("open");

            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let text = text.as_str().to_string();
                        if text == "40" {
                            ws.send(Message::text(r#"40{"sid":"n1"}"#)).await.expect("ack");
                        }
                        if text.starts_with(r#"42["authenticate""#)
                            && let Some(tx) = authenticated_tx.take()
                        {
                            let _ = tx.send(());
                        }
                        received.push(text);
                    }
                    Some(Ok(Message::Close(_))) => {
                        received.push("<close>".to_string());
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        received.push(format!("<err {e}>"));
                        break;
                    }
                    None => break,
                }
            }
            received
        });

        let (manager, _dispatcher) = ConnectionManager::new();
        manager
            .initialize("alice", "pw", "127.0.0.1", port)
            .expect("initialize");
        manager.connect().expect("connect");

        tokio::time::timeout(Duration::from_secs(5), authenticated_rx)
            .await
            .expect("authenticated in time")
            .expect("server saw authenticate");
        assert!(manager.is_connected());

        manager.disconnect().expect("disconnect");

        let received = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server done in time")
            .expect("server task");
        assert_eq!(
            received,
            vec![
                "40".to_string(),
                r#"42["authenticate","alice","pw","onAuthentication"]"#.to_string(),
                "41".to_string(),
                "<close>".to_string(),
            ]
        );
    }
}
