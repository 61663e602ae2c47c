//! Socket.IO v5 packet codec.
//!
//! Socket.IO packets travel inside Engine.IO `message` packets.
//!
//! # Format
//!
//! ```text
//! <type>[<attachments>-][<namespace>,][<ack id>][<JSON data>]
//! ```
//!
//! Binary arguments are lifted out of the JSON and replaced with
//! `{"_placeholder":true,"num":N}`; the raw bytes follow as separate
//! WebSocket binary frames, one per attachment, in order.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::error::{Error, Result};

use super::packet::EnginePacket;

// ============================================================================
// Constants
// ============================================================================

/// The default namespace. Omitted on the wire.
pub const DEFAULT_NAMESPACE: &str = "/";

const PLACEHOLDER_KEY: &str = "_placeholder";
const PLACEHOLDER_NUM: &str = "num";

/// Upper bound on declared attachments per packet.
const MAX_ATTACHMENTS: usize = 64;

// ============================================================================
// PacketKind
// ============================================================================

/// Socket.IO packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Namespace connect request / acknowledgement.
    Connect,
    /// Namespace disconnect.
    Disconnect,
    /// Named event with JSON arguments.
    Event,
    /// Acknowledgement with JSON arguments.
    Ack,
    /// Namespace connect refused.
    ConnectError,
    /// Named event with binary attachments.
    BinaryEvent,
    /// Acknowledgement with binary attachments.
    BinaryAck,
}

impl PacketKind {
    /// Returns the wire digit.
    #[must_use]
    pub const fn as_char(&self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
            Self::BinaryEvent => '5',
            Self::BinaryAck => '6',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '0' => Self::Connect,
            '1' => Self::Disconnect,
            '2' => Self::Event,
            '3' => Self::Ack,
            '4' => Self::ConnectError,
            '5' => Self::BinaryEvent,
            '6' => Self::BinaryAck,
            _ => return None,
        })
    }

    /// Returns `true` for packet types that declare attachments.
    #[inline]
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::BinaryEvent | Self::BinaryAck)
    }
}

// ============================================================================
// Arg
// ============================================================================

/// One argument of an outbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Inline JSON value.
    Json(Value),
    /// Raw bytes sent as an attachment frame.
    Binary(Vec<u8>),
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Json(Value::String(value.to_string()))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Json(Value::String(value))
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<Vec<u8>> for Arg {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

// ============================================================================
// Frames
// ============================================================================

/// A fully encoded outbound packet: one text frame plus its attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frames {
    /// Engine.IO-prefixed text frame.
    pub text: String,
    /// Binary frames to send right after `text`, in order.
    pub binary: Vec<Vec<u8>>,
}

impl Frames {
    /// Total payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len() + self.binary.iter().map(Vec::len).sum::<usize>()
    }

    /// Returns `true` if there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// SocketPacket
// ============================================================================

/// A decoded or to-be-encoded Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    /// Packet type.
    pub kind: PacketKind,
    /// Namespace (`/` by default).
    pub namespace: String,
    /// Acknowledgement ID, if the sender expects an ack.
    pub ack_id: Option<u64>,
    /// JSON body.
    pub data: Option<Value>,
    /// Number of binary frames that follow this packet.
    pub attachments: usize,
}

impl SocketPacket {
    /// Creates a connect request for the default namespace.
    #[must_use]
    pub fn connect() -> Self {
        Self::bare(PacketKind::Connect)
    }

    /// Creates a disconnect for the default namespace.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::bare(PacketKind::Disconnect)
    }

    fn bare(kind: PacketKind) -> Self {
        Self {
            kind,
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            data: None,
            attachments: 0,
        }
    }

    /// Builds an event packet, lifting binary args into attachments.
    ///
    /// Returns the packet and the attachment buffers in placeholder order.
    #[must_use]
    pub fn event(name: &str, args: Vec<Arg>) -> (Self, Vec<Vec<u8>>) {
        let mut data = Vec::with_capacity(args.len() + 1);
        let mut buffers = Vec::new();
        data.push(Value::String(name.to_string()));

        for arg in args {
            match arg {
                Arg::Json(value) => data.push(value),
                Arg::Binary(bytes) => {
                    data.push(json!({ PLACEHOLDER_KEY: true, PLACEHOLDER_NUM: buffers.len() }));
                    buffers.push(bytes);
                }
            }
        }

        let kind = if buffers.is_empty() {
            PacketKind::Event
        } else {
            PacketKind::BinaryEvent
        };

        let packet = Self {
            kind,
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            data: Some(Value::Array(data)),
            attachments: buffers.len(),
        };

        (packet, buffers)
    }

    /// Encodes the Socket.IO body (without the Engine.IO prefix).
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.as_char());

        if self.kind.is_binary() {
            out.push_str(&self.attachments.to_string());
            out.push('-');
        }

        if self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }

        if let Some(id) = self.ack_id {
            out.push_str(&id.to_string());
        }

        if let Some(ref data) = self.data {
            out.push_str(&data.to_string());
        }

        out
    }

    /// Encodes the packet as an Engine.IO text frame.
    #[must_use]
    pub fn to_engine_text(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }

    /// Decodes a Socket.IO body (the payload of an Engine.IO `message`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on an unknown type, a malformed
    /// attachment header, or invalid JSON.
    pub fn decode(text: &str) -> Result<Self> {
        let mut rest = text;

        let kind_char = rest
            .chars()
            .next()
            .ok_or_else(|| Error::protocol("Empty Socket.IO packet"))?;
        let kind = PacketKind::from_char(kind_char).ok_or_else(|| {
            Error::protocol(format!("Unknown Socket.IO packet type: {kind_char:?}"))
        })?;
        rest = &rest[kind_char.len_utf8()..];

        let mut attachments = 0;
        if kind.is_binary() {
            let dash = rest
                .find('-')
                .ok_or_else(|| Error::protocol("Binary packet without attachment count"))?;
            attachments = rest[..dash]
                .parse::<usize>()
                .map_err(|_| Error::protocol("Invalid attachment count"))?;
            if attachments > MAX_ATTACHMENTS {
                return Err(Error::protocol(format!(
                    "Too many attachments: {attachments}"
                )));
            }
            rest = &rest[dash + 1..];
        }

        let mut namespace = DEFAULT_NAMESPACE.to_string();
        if rest.starts_with('/') {
            match rest.find(',') {
                Some(comma) => {
                    namespace = rest[..comma].to_string();
                    rest = &rest[comma + 1..];
                }
                None => {
                    namespace = rest.to_string();
                    rest = "";
                }
            }
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|_| Error::protocol("Invalid ack id"))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(rest)
                    .map_err(|e| Error::protocol(format!("Invalid packet data: {e}")))?,
            )
        };

        Ok(Self {
            kind,
            namespace,
            ack_id,
            data,
            attachments,
        })
    }

    /// Splits an event packet into its name and arguments.
    ///
    /// `attachments` are the binary frames collected after the packet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if this is not an event, the data is not
    /// an array, or the first element is not a string.
    pub fn into_event(self, attachments: Vec<Vec<u8>>) -> Result<(String, Payload)> {
        if !matches!(self.kind, PacketKind::Event | PacketKind::BinaryEvent) {
            return Err(Error::protocol(format!(
                "Expected event packet, got {:?}",
                self.kind
            )));
        }

        let Some(Value::Array(mut items)) = self.data else {
            return Err(Error::protocol("Event data is not an array"));
        };

        if items.is_empty() {
            return Err(Error::protocol("Event without name"));
        }

        let name = match items.remove(0) {
            Value::String(name) => name,
            other => {
                return Err(Error::protocol(format!("Event name is not a string: {other}")));
            }
        };

        Ok((
            name,
            Payload {
                args: items,
                attachments,
            },
        ))
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Arguments delivered to a listener.
///
/// Lifecycle events carry at most one argument (a reason string or an
/// attempt number); application events carry what the server sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    /// JSON arguments after the event name.
    pub args: Vec<Value>,
    /// Binary attachments referenced by placeholders in `args`.
    pub attachments: Vec<Vec<u8>>,
}

impl Payload {
    /// Creates a payload from JSON arguments.
    #[inline]
    #[must_use]
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            args,
            attachments: Vec::new(),
        }
    }

    /// Creates an empty payload.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a single-string payload (lifecycle reasons).
    #[inline]
    #[must_use]
    pub fn text(reason: impl Into<String>) -> Self {
        Self::new(vec![Value::String(reason.into())])
    }

    /// Returns argument `index`.
    #[inline]
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Returns the first argument rendered as text, if any.
    ///
    /// Strings are returned without quotes; other JSON values are printed.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.args.first().map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Returns the attachment a placeholder argument points at.
    #[must_use]
    pub fn attachment(&self, index: usize) -> Option<&[u8]> {
        let num = self
            .arg(index)?
            .get(PLACEHOLDER_NUM)?
            .as_u64()?;
        self.attachments.get(num as usize).map(Vec::as_slice)
    }
}

// ============================================================================
// Tests
// ============================================================================
