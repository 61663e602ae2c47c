//! Application-level events exchanged with the processing server.
//!
//! # Outbound
//!
//! | Event | Arguments |
//! |-------|-----------|
//! | `authenticate` | username, password, reply event |
//! | `receiveImage` | image bytes, reply event |
//! | `receiveVideoStream` | frame bytes, sequence number |
//! | `processVideo` | none |
//! | `checkTranscript` | reply event |
//! | `stopRecord` | reply event |
//!
//! # Inbound
//!
//! | Event | Payload |
//! |-------|---------|
//! | `onAuthentication` | `bool` |
//! | `onResponse` | `{ "result"?: string, "isGloss"?: bool }` |
//! | `onTranscriptGenerated` | `string` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::message::{Arg, Frames, Payload, SocketPacket};

// ============================================================================
// Event Names
// ============================================================================

/// Reply event carrying the authentication outcome.
pub const EVENT_AUTHENTICATION: &str = "onAuthentication";

/// Reply event carrying a recognition result.
pub const EVENT_RESPONSE: &str = "onResponse";

/// Event carrying generated transcript text.
pub const EVENT_TRANSCRIPT: &str = "onTranscriptGenerated";

// ============================================================================
// OutboundEvent
// ============================================================================

/// An event sent from the client to the server.
///
/// Frame-carrying variants send their bytes as a binary attachment.
#[derive(Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Log in with the session credentials.
    Authenticate {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
        /// Event the server should answer on.
        reply_event: String,
    },
    /// A single still frame for recognition.
    ReceiveImage {
        /// Encoded image.
        image: Vec<u8>,
        /// Event the server should answer on.
        reply_event: String,
    },
    /// One frame of a recorded video.
    ReceiveVideoStream {
        /// Encoded frame.
        frame: Vec<u8>,
        /// Caller-assigned sequence number.
        sequence: u32,
    },
    /// Start processing the frames streamed so far.
    ProcessVideo,
    /// Ask for the current transcript.
    CheckTranscript {
        /// Event the server should answer on.
        reply_event: String,
    },
    /// Stop recording and request a prediction.
    StopRecord {
        /// Event the server should answer on.
        reply_event: String,
    },
}

impl OutboundEvent {
    /// Creates an `authenticate` event answered on [`EVENT_AUTHENTICATION`].
    #[must_use]
    pub fn authenticate(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Authenticate {
            username: username.into(),
            password: password.into(),
            reply_event: EVENT_AUTHENTICATION.to_string(),
        }
    }

    /// Creates a `receiveImage` event answered on [`EVENT_RESPONSE`].
    #[must_use]
    pub fn receive_image(image: Vec<u8>) -> Self {
        Self::ReceiveImage {
            image,
            reply_event: EVENT_RESPONSE.to_string(),
        }
    }

    /// Creates a `receiveVideoStream` event.
    #[must_use]
    pub fn receive_video_stream(frame: Vec<u8>, sequence: u32) -> Self {
        Self::ReceiveVideoStream { frame, sequence }
    }

    /// Creates a `checkTranscript` event answered on [`EVENT_TRANSCRIPT`].
    #[must_use]
    pub fn check_transcript() -> Self {
        Self::CheckTranscript {
            reply_event: EVENT_TRANSCRIPT.to_string(),
        }
    }

    /// Creates a `stopRecord` event answered on [`EVENT_RESPONSE`].
    #[must_use]
    pub fn stop_record() -> Self {
        Self::StopRecord {
            reply_event: EVENT_RESPONSE.to_string(),
        }
    }

    /// Returns the wire event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::ReceiveImage { .. } => "receiveImage",
            Self::ReceiveVideoStream { .. } => "receiveVideoStream",
            Self::ProcessVideo => "processVideo",
            Self::CheckTranscript { .. } => "checkTranscript",
            Self::StopRecord { .. } => "stopRecord",
        }
    }

    /// Converts the event into its ordered wire arguments.
    #[must_use]
    pub fn into_args(self) -> Vec<Arg> {
        match self {
            Self::Authenticate {
                username,
                password,
                reply_event,
            } => vec![username.into(), password.into(), reply_event.into()],
            Self::ReceiveImage { image, reply_event } => {
                vec![Arg::Binary(image), reply_event.into()]
            }
            Self::ReceiveVideoStream { frame, sequence } => {
                vec![Arg::Binary(frame), sequence.into()]
            }
            Self::ProcessVideo => Vec::new(),
            Self::CheckTranscript { reply_event } | Self::StopRecord { reply_event } => {
                vec![reply_event.into()]
            }
        }
    }

    /// Encodes the event into WebSocket frames.
    #[must_use]
    pub fn into_frames(self) -> Frames {
        let name = self.name();
        let (packet, binary) = SocketPacket::event(name, self.into_args());
        Frames {
            text: packet.to_engine_text(),
            binary,
        }
    }
}

impl fmt::Debug for OutboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticate {
                username,
                reply_event,
                ..
            } => f
                .debug_struct("Authenticate")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("reply_event", reply_event)
                .finish(),
            Self::ReceiveImage { image, reply_event } => f
                .debug_struct("ReceiveImage")
                .field("bytes", &image.len())
                .field("reply_event", reply_event)
                .finish(),
            Self::ReceiveVideoStream { frame, sequence } => f
                .debug_struct("ReceiveVideoStream")
                .field("bytes", &frame.len())
                .field("sequence", sequence)
                .finish(),
            Self::ProcessVideo => f.write_str("ProcessVideo"),
            Self::CheckTranscript { reply_event } => f
                .debug_struct("CheckTranscript")
                .field("reply_event", reply_event)
                .finish(),
            Self::StopRecord { reply_event } => f
                .debug_struct("StopRecord")
                .field("reply_event", reply_event)
                .finish(),
        }
    }
}

// ============================================================================
// ServerResponse
// ============================================================================

/// Recognition result carried by [`EVENT_RESPONSE`].
///
/// Both fields are optional on the wire and default to empty / `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerResponse {
    /// Recognised text.
    pub result: String,
    /// `true` when `result` is a gloss rather than plain text.
    pub is_gloss: bool,
}

impl ServerResponse {
    /// Reads a response from the first event argument.
    ///
    /// Never fails: each field is read only if present, and a field of the
    /// wrong type is logged and treated as absent. A JSON object encoded as
    /// a string is accepted too.
    #[must_use]
    pub fn from_payload(payload: &Payload) -> Self {
        match payload.arg(0) {
            Some(Value::Object(map)) => Self::from_map(map),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => Self::from_map(&map),
                _ => {
                    warn!(payload = %text, "Response payload is not a JSON object");
                    Self::default()
                }
            },
            Some(other) => {
                warn!(payload = %other, "Response payload is not a JSON object");
                Self::default()
            }
            None => {
                warn!("Response event without payload");
                Self::default()
            }
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let mut response = Self::default();

        if let Some(value) = map.get("result") {
            match value.as_str() {
                Some(result) => {
                    debug!(result, "Response result");
                    response.result = result.to_string();
                }
                None => warn!(value = %value, "Ignoring non-string result"),
            }
        }

        if let Some(value) = map.get("isGloss") {
            match parse_bool(value) {
                Some(is_gloss) => {
                    debug!(is_gloss, "Response isGloss");
                    response.is_gloss = is_gloss;
                }
                None => warn!(value = %value, "Ignoring non-boolean isGloss"),
            }
        }

        response
    }
}

/// Reads a boolean, accepting the strings `"true"` and `"false"`.
fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

// ============================================================================
// InboundEvent
// ============================================================================

/// Typed view of an application event received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Outcome of `authenticate`.
    Authentication(bool),
    /// Recognition result.
    Response(ServerResponse),
    /// Transcript text.
    Transcript(String),
}

impl InboundEvent {
    /// Parses a named event.
    ///
    /// Returns `Ok(None)` for events this client does not know about.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if an authentication or transcript event
    /// carries the wrong argument type. Response payloads never fail; see
    /// [`ServerResponse::from_payload`].
    pub fn parse(event: &str, payload: &Payload) -> Result<Option<Self>> {
        match event {
            EVENT_AUTHENTICATION => {
                let success = payload.arg(0).and_then(parse_bool).ok_or_else(|| {
                    Error::protocol(format!(
                        "{EVENT_AUTHENTICATION} expects a boolean, got {:?}",
                        payload.arg(0)
                    ))
                })?;
                Ok(Some(Self::Authentication(success)))
            }
            EVENT_RESPONSE => Ok(Some(Self::Response(ServerResponse::from_payload(payload)))),
            EVENT_TRANSCRIPT => {
                let text = payload
                    .arg(0)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::protocol(format!(
                            "{EVENT_TRANSCRIPT} expects a string, got {:?}",
                            payload.arg(0)
                        ))
                    })?;
                Ok(Some(Self::Transcript(text.to_string())))
            }
            _ => Ok(None),
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

    #[test]
    fn test_authenticate_frames() {
        let frames = OutboundEvent::authenticate("alice", "pw").into_frames();
        assert_eq!(
            frames.text,
            r#"42["authenticate","alice","pw","onAuthentication"]"#
        );
        assert!(frames.binary.is_empty());
    }

    #[test]
    fn test_receive_image_frames() {
        let frames = OutboundEvent::receive_image(vec![0xff, 0xd8]).into_frames();
        assert_eq!(
            frames.text,
            r#"451-["receiveImage",{"_placeholder":true,"num":0},"onResponse"]"#
        );
        assert_eq!(frames.binary, vec![vec![0xff, 0xd8]]);
    }

    #[test]
    fn test_video_frame_passes_sequence_through() {
        let frames = OutboundEvent::receive_video_stream(vec![1], 41).into_frames();
        assert_eq!(
            frames.text,
            r#"451-["receiveVideoStream",{"_placeholder":true,"num":0},41]"#
        );
    }

    #[test]
    fn test_control_events() {
        assert_eq!(
            OutboundEvent::ProcessVideo.into_frames().text,
            r#"42["processVideo"]"#
        );
        assert_eq!(
            OutboundEvent::check_transcript().into_frames().text,
            r#"42["checkTranscript","onTranscriptGenerated"]"#
        );
        assert_eq!(
            OutboundEvent::stop_record().into_frames().text,
            r#"42["stopRecord","onResponse"]"#
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", OutboundEvent::authenticate("alice", "hunter2"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_response_missing_is_gloss_defaults_false() {
        let payload = Payload::new(vec![json!({ "result": "HELLO" })]);
        let response = ServerResponse::from_payload(&payload);
        assert_eq!(response.result, "HELLO");
        assert!(!response.is_gloss);
    }

    #[test]
    fn test_response_bad_field_is_treated_as_absent() {
        let payload = Payload::new(vec![json!({ "result": 7, "isGloss": true })]);
        let response = ServerResponse::from_payload(&payload);
        assert_eq!(response.result, "");
        assert!(response.is_gloss);
    }

    #[test]
    fn test_response_accepts_string_encoded_object() {
        let payload = Payload::new(vec![json!(r#"{"result":"A B","isGloss":"true"}"#)]);
        let response = ServerResponse::from_payload(&payload);
        assert_eq!(response.result, "A B");
        assert!(response.is_gloss);
    }

    #[test]
    fn test_response_without_payload_is_empty() {
        assert_eq!(
            ServerResponse::from_payload(&Payload::empty()),
            ServerResponse::default()
        );
    }

    #[test]
    fn test_parse_inbound_events() {
        assert_eq!(
            InboundEvent::parse(EVENT_AUTHENTICATION, &Payload::new(vec![json!(true)])).unwrap(),
            Some(InboundEvent::Authentication(true))
        );
        assert_eq!(
            InboundEvent::parse(EVENT_TRANSCRIPT, &Payload::text("hello world")).unwrap(),
            Some(InboundEvent::Transcript("hello world".into()))
        );
        assert_eq!(
            InboundEvent::parse("somethingElse", &Payload::empty()).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        assert!(InboundEvent::parse(EVENT_AUTHENTICATION, &Payload::text("maybe")).is_err());
        assert!(InboundEvent::parse(EVENT_TRANSCRIPT, &Payload::new(vec![json!(1)])).is_err());
    }
}
