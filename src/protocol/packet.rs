//! Engine.IO v4 packet codec.
//!
//! Engine.IO is the framing layer underneath Socket.IO. Over a WebSocket
//! every text frame is exactly one packet, identified by its leading digit.
//! Binary frames carry Socket.IO attachments verbatim and are not handled
//! here.
//!
//! | Digit | Packet | Direction |
//! |-------|--------|-----------|
//! | `0` | `open` (handshake JSON) | server → client |
//! | `1` | `close` | both |
//! | `2` | `ping` | server → client |
//! | `3` | `pong` | client → server |
//! | `4` | `message` | both |
//! | `5` | `upgrade` | client → server |
//! | `6` | `noop` | both |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Engine.IO protocol revision spoken by this client.
pub const ENGINE_IO_VERSION: u8 = 4;

/// Path the server mounts the Socket.IO endpoint on.
pub const ENGINE_IO_PATH: &str = "/socket.io/";

/// Largest `pingInterval` or `pingTimeout` accepted in a handshake (one day).
pub const MAX_PING_MS: u64 = 24 * 60 * 60 * 1000;

// ============================================================================
// HandshakeData
// ============================================================================

/// Payload of the server's `open` packet.
///
/// # Format
///
/// ```json
/// {
///   "sid": "lv_VI97HAXpY6yYWAAAC",
///   "upgrades": [],
///   "pingInterval": 25000,
///   "pingTimeout": 20000,
///   "maxPayload": 1000000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeData {
    /// Engine.IO session ID.
    pub sid: String,

    /// Transports the server offers to upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,

    /// Milliseconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,

    /// Milliseconds the server waits for a pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,

    /// Largest payload the server accepts, in bytes.
    #[serde(default)]
    pub max_payload: Option<u64>,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl HandshakeData {
    /// How long the connection may stay silent before it is considered dead.
    ///
    /// The server pings every `pingInterval`; if nothing arrives within an
    /// extra `pingTimeout` the link is gone.
    #[inline]
    #[must_use]
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }

    /// Rejects heartbeat timings no server would mean.
    fn validate(self) -> Result<Self> {
        for (field, value) in [
            ("pingInterval", self.ping_interval),
            ("pingTimeout", self.ping_timeout),
        ] {
            if value > MAX_PING_MS {
                return Err(Error::protocol(format!(
                    "Handshake {field} of {value} ms exceeds {MAX_PING_MS} ms"
                )));
            }
        }
        Ok(self)
    }
}

// ============================================================================
// EnginePacket
// ============================================================================

/// A single Engine.IO packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    /// Handshake sent by the server right after the WebSocket opens.
    Open(HandshakeData),
    /// Transport close request.
    Close,
    /// Heartbeat probe, optionally carrying data to echo back.
    Ping(String),
    /// Heartbeat answer.
    Pong(String),
    /// Socket.IO payload.
    Message(String),
    /// Transport upgrade (unused over a direct WebSocket).
    Upgrade,
    /// No-op.
    Noop,
}

impl EnginePacket {
    /// Decodes a WebSocket text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is empty, starts with an
    /// unknown type digit, or carries an unreadable handshake.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::protocol("Empty Engine.IO packet"))?;
        let body = chars.as_str();

        match kind {
            '0' => {
                let handshake: HandshakeData = serde_json::from_str(body).map_err(|e| {
                    Error::protocol(format!("Invalid Engine.IO handshake: {e}"))
                })?;
                Ok(Self::Open(handshake.validate()?))
            }
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(body.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::protocol(format!(
                "Unknown Engine.IO packet type: {other:?}"
            ))),
        }
    }

    /// Encodes the packet as a WebSocket text frame.
    ///
    /// `Open` is server-only; encoding it yields just the type digit.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
