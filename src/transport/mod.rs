//! Event-socket transport layer.
//!
//! This module owns the duplex connection to the processing server and
//! hides it behind the [`Transport`] trait, so the connection manager can
//! be driven by an in-memory transport in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌──────────────────┐
//! │  ConnectionManager   │                         │  Processing      │
//! │                      │        WebSocket        │  Server          │
//! │  Transport ──────────┼────────────────────────►│  (Socket.IO)     │
//! │  └ Emitter ◄─────────┼─────────────────────────┤                  │
//! └──────────────────────┘   host:port/socket.io   └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connector::create` - Build a closed transport for an endpoint
//! 2. `Transport::open` - Start the background connect/reconnect task
//! 3. `connect` event - Handshake done, emissions allowed
//! 4. `disconnect` / `reconnect_*` events - Link lost, transport retries
//! 5. `Transport::close` - Stop the task and close the socket
//!
//! # Lifecycle Events
//!
//! | Event | Payload |
//! |-------|---------|
//! | [`EVENT_CONNECT`] | none |
//! | [`EVENT_CONNECT_ERROR`] | reason |
//! | [`EVENT_DISCONNECT`] | reason |
//! | [`EVENT_RECONNECT_ATTEMPT`] | attempt number |
//! | [`EVENT_RECONNECT_ERROR`] | reason |
//! | [`EVENT_RECONNECT_FAILED`] | reason |
//! | [`EVENT_ERROR`] | reason |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use url::Url;

use crate::error::Result;
use crate::identifiers::ConnectionId;
use crate::protocol::OutboundEvent;

// ============================================================================
// Submodules
// ============================================================================

/// Named-event listener table.
pub mod emitter;

/// Connection and reconnection options.
pub mod options;

/// WebSocket-backed event socket.
pub mod socket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use emitter::{Emitter, Listener};
pub use options::SocketOptions;
pub use socket::{EventSocket, SocketConnector};

// ============================================================================
// Lifecycle Events
// ============================================================================

/// Handshake completed.
pub const EVENT_CONNECT: &str = "connect";

/// A connection attempt failed.
pub const EVENT_CONNECT_ERROR: &str = "connect_error";

/// The connection closed, by request or not.
pub const EVENT_DISCONNECT: &str = "disconnect";

/// A reconnection attempt is starting.
pub const EVENT_RECONNECT_ATTEMPT: &str = "reconnect_attempt";

/// A reconnection attempt failed.
pub const EVENT_RECONNECT_ERROR: &str = "reconnect_error";

/// All reconnection attempts failed; the transport stopped.
pub const EVENT_RECONNECT_FAILED: &str = "reconnect_failed";

/// Transport-level error (handshake timeout, undecodable packet).
pub const EVENT_ERROR: &str = "error";

// ============================================================================
// Transport
// ============================================================================

/// A duplex, reconnecting named-event connection.
///
/// All methods are non-blocking; outcomes surface later as events on
/// [`Transport::emitter`].
pub trait Transport: Send + Sync + 'static {
    /// Returns the connection generation.
    fn id(&self) -> ConnectionId;

    /// Returns `true` while the handshake is complete and the link is up.
    fn is_connected(&self) -> bool;

    /// Starts connecting in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`](crate::Error::Runtime) if there is no
    /// runtime to drive the connection.
    fn open(&self) -> Result<()>;

    /// Closes the connection and stops reconnecting.
    ///
    /// The close completes in the background and ends with a `disconnect`
    /// event, even if the transport is dropped right after.
    fn close(&self);

    /// Queues an event for sending.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`](crate::Error::NotConnected) if the link is down
    /// - [`Error::QueueFull`](crate::Error::QueueFull) if the outbound queue is saturated
    fn emit(&self, event: OutboundEvent) -> Result<()>;

    /// Returns the listener table events are fired on.
    fn emitter(&self) -> &Emitter;
}

// ============================================================================
// Connector
// ============================================================================

/// Factory for transports.
///
/// The connection manager calls this once per `initialize`.
pub trait Connector: Send + Sync + 'static {
    /// Transport type produced by this connector.
    type Transport: Transport;

    /// Creates a closed transport for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be used with `options`.
    fn create(&self, endpoint: &Url, options: &SocketOptions) -> Result<Arc<Self::Transport>>;
}
