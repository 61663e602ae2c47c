//! Wire protocol: Engine.IO framing, Socket.IO packets, application events.
//!
//! # Layers
//!
//! | Layer | Module | Carries |
//! |-------|--------|---------|
//! | Engine.IO v4 | `packet` | handshake, heartbeat, message envelopes |
//! | Socket.IO v5 | `message` | namespaced events with binary attachments |
//! | Application | `event` | `authenticate`, frames, control requests, results |
//!
//! # Example Frames
//!
//! ```text
//! → 42["authenticate","alice","pw","onAuthentication"]
//! ← 42["onAuthentication",true]
//! → 451-["receiveImage",{"_placeholder":true,"num":0},"onResponse"]
//! → <binary frame: JPEG bytes>
//! ← 42["onResponse",{"result":"HELLO","isGloss":true}]
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Application events and result payloads.
pub mod event;

/// Socket.IO packet codec.
pub mod message;

/// Engine.IO packet codec.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{
    EVENT_AUTHENTICATION, EVENT_RESPONSE, EVENT_TRANSCRIPT, InboundEvent, OutboundEvent,
    ServerResponse,
};
pub use message::{Arg, Frames, PacketKind, Payload, SocketPacket};
pub use packet::{EnginePacket, HandshakeData};
