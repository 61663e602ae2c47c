//! Error types for framecast.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use framecast::{ConnectionManager, Result};
//!
//! fn example(manager: &ConnectionManager) -> Result<()> {
//!     manager.initialize("alice", "pw", "127.0.0.1", 9000)?;
//!     manager.connect()?;
//!     Ok(())
//! }
//! ```
//!
//! None of these errors is fatal: every failing operation leaves the
//! manager usable, and callers that only want fire-and-forget behaviour
//! may discard the result.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Construction | [`Error::InvalidAddress`], [`Error::Config`] |
//! | Precondition | [`Error::NotInitialized`], [`Error::AlreadyConnected`], [`Error::MissingCredentials`], [`Error::NoConnection`], [`Error::NotConnected`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::ReconnectExhausted`], [`Error::QueueFull`], [`Error::Runtime`] |
//! | Payload | [`Error::Protocol`], [`Error::InvalidFrame`] |
//! | External | [`Error::WebSocket`], [`Error::Image`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use image::ImageError;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Construction Errors
    // ========================================================================
    /// Server address could not be turned into an endpoint URL.
    ///
    /// Returned by `initialize` when host or port are malformed.
    #[error("Invalid server address {address}: {message}")]
    InvalidAddress {
        /// The address as it was supplied.
        address: String,
        /// Why it was rejected.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Precondition Errors
    // ========================================================================
    /// No connection object exists. Call `initialize` first.
    #[error("Cannot connect: connection is not initialized")]
    NotInitialized,

    /// The connection is already open.
    #[error("Already connected to server")]
    AlreadyConnected,

    /// No username has been configured.
    #[error("Cannot connect: username is not defined")]
    MissingCredentials,

    /// `disconnect` was called without a connection object.
    #[error("Cannot disconnect: no connection exists")]
    NoConnection,

    /// An emission was attempted while the connection is absent or closed.
    #[error("Cannot {operation}: connection is absent or closed")]
    NotConnected {
        /// The operation that was skipped.
        operation: &'static str,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The transport gave up reconnecting.
    #[error("Reconnection failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Too many frames are waiting to be written to the socket.
    ///
    /// The frame was dropped rather than queued.
    #[error("Outbound queue full: {queued}/{max}")]
    QueueFull {
        /// Frames waiting when the send was attempted.
        queued: usize,
        /// Configured limit.
        max: usize,
    },

    /// No async runtime is available to drive the transport.
    #[error("Runtime error: {message}")]
    Runtime {
        /// Description of the runtime error.
        message: String,
    },

    // ========================================================================
    // Payload Errors
    // ========================================================================
    /// Malformed packet or unexpected payload shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Raw frame buffer does not match its declared dimensions.
    #[error("Invalid frame: {message}")]
    InvalidFrame {
        /// What was wrong with the buffer.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Frame encoding error.
    #[error("Image error: {0}")]
    Image(#[from] ImageError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid address error.
    #[inline]
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a not connected error for the named operation.
    #[inline]
    pub fn not_connected(operation: &'static str) -> Self {
        Self::NotConnected { operation }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a reconnect exhausted error.
    #[inline]
    pub fn reconnect_exhausted(attempts: u32) -> Self {
        Self::ReconnectExhausted { attempts }
    }

    /// Creates a queue full error.
    #[inline]
    pub fn queue_full(queued: usize, max: usize) -> Self {
        Self::QueueFull { queued, max }
    }

    /// Creates a runtime error.
    #[inline]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid frame error.
    #[inline]
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if a caller precondition was not met.
    ///
    /// These are reports, not faults: the call was a no-op.
    #[inline]
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::AlreadyConnected
                | Self::MissingCredentials
                | Self::NoConnection
                | Self::NotConnected { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::ReconnectExhausted { .. }
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
