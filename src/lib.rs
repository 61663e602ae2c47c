//! framecast - Resilient event-stream client for media processing servers.
//!
//! This library streams camera frames to a remote image/video processing
//! server and routes the server's replies to a single consumer owned by the
//! application's UI.
//!
//! # Architecture
//!
//! The client keeps one duplex connection per session:
//!
//! - **Outbound**: frames and control events, best effort, never buffered
//!   while the link is down
//! - **Inbound**: authentication results, recognition results and
//!   transcripts, delivered through a channel to a [`Dispatcher`]
//!
//! Key design principles:
//!
//! - The [`ConnectionManager`] is an explicit value, not a global
//! - A fixed listener table handles transport events with explicit state
//! - Only the [`Dispatcher`] ever calls the [`ResultConsumer`]
//! - Reconnection is owned by the transport: fixed delay, bounded attempts
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use framecast::{ConnectionManager, ResultConsumer, Result};
//!
//! struct Screen;
//!
//! impl ResultConsumer for Screen {
//!     fn on_connected(&self, success: bool) {
//!         println!("connected: {success}");
//!     }
//!     fn display_response(&self, result: &str, is_gloss: bool) {
//!         println!("{result} (gloss: {is_gloss})");
//!     }
//!     fn add_new_transcript(&self, transcript: &str) {
//!         println!("{transcript}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (manager, dispatcher) = ConnectionManager::new();
//!     manager.register_consumer(Arc::new(Screen));
//!
//!     manager.initialize("alice", "pw", "127.0.0.1", 9000)?;
//!     manager.connect()?;
//!     tokio::spawn(dispatcher.run());
//!
//!     manager.send_image(std::fs::read("frame.jpg").unwrap_or_default())?;
//!     manager.disconnect()?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`ConnectionManager`], [`Dispatcher`], [`ResultConsumer`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`frame`] | Frame encoding and sequencing helpers |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Engine.IO / Socket.IO codec and application events |
//! | [`transport`] | Event socket, options, and the [`Transport`] seam |

// ============================================================================
// Modules
// ============================================================================

/// Connection manager and result delivery.
///
/// - [`ConnectionManager`] - Lifecycle and outbound API
/// - [`Dispatcher`] - Delivers results on the UI context
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Media frames, encoding, and sequence numbers.
pub mod frame;

/// Type-safe identifiers for listeners and connections.
pub mod identifiers;

/// Wire protocol codec.
///
/// Engine.IO framing, Socket.IO packets, and the application events.
pub mod protocol;

/// Event-socket transport layer.
///
/// WebSocket connection, reconnection policy, and listener table.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    ConnectionManager, Delivery, Dispatcher, FrameRetryPolicy, ResultConsumer, SessionConfig,
};

// Error types
pub use error::{Error, Result};

// Frame types
pub use frame::{FrameEncoder, FrameFormat, FrameKind, FrameSequencer, MediaFrame};

// Identifier types
pub use identifiers::{ConnectionId, ListenerId};

// Protocol types
pub use protocol::{InboundEvent, OutboundEvent, ServerResponse};

// Transport types
pub use transport::{Connector, EventSocket, SocketConnector, SocketOptions, Transport};
