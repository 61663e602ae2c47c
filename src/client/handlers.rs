//! Fixed listener table.
//!
//! Every transport event the manager cares about maps to one plain
//! function taking the shared [`HandlerState`]. The whole table is
//! registered on `connect` and removed on `disconnect` as a group.
//!
//! | Event | Handler | Effect |
//! |-------|---------|--------|
//! | `connect` | [`on_connected`] | emit `authenticate` |
//! | `connect_error` | [`on_connect_error`] | log |
//! | `reconnect_attempt` | [`on_reconnect_attempt`] | log |
//! | `reconnect_error` | [`on_reconnect_error`] | log |
//! | `reconnect_failed` | [`on_reconnect_failed`] | deliver `Connected(false)` |
//! | `disconnect` | [`on_disconnected`] | log |
//! | `onAuthentication` | [`on_authentication`] | deliver `Connected(bool)` |
//! | `onResponse` | [`on_response`] | deliver `Response` |
//! | `onTranscriptGenerated` | [`on_transcript`] | deliver `Transcript` |
//! | `error` | [`on_timeout`], [`on_event_error`] | log |

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use tracing::{debug, error, info, warn};

use crate::identifiers::ListenerId;
use crate::protocol::{
    EVENT_AUTHENTICATION, EVENT_RESPONSE, EVENT_TRANSCRIPT, InboundEvent, OutboundEvent, Payload,
    ServerResponse,
};
use crate::transport::{
    EVENT_CONNECT, EVENT_CONNECT_ERROR, EVENT_DISCONNECT, EVENT_ERROR, EVENT_RECONNECT_ATTEMPT,
    EVENT_RECONNECT_ERROR, EVENT_RECONNECT_FAILED, Emitter, Transport,
};

use super::config::SessionConfig;
use super::consumer::{ConsumerSlot, Delivery, DeliverySender};

// ============================================================================
// Types
// ============================================================================

/// Handler function signature.
pub(crate) type Handler = fn(&HandlerState, &Payload);

/// Registered listener ids, kept for unregistration.
pub(crate) type Registrations = Vec<(&'static str, ListenerId)>;

/// Payload of the handshake-timeout `error` event.
const TIMEOUT_REASON: &str = "timeout";

/// The listener set.
pub(crate) const LISTENERS: &[(&str, Handler)] = &[
    (EVENT_CONNECT, on_connected),
    (EVENT_CONNECT_ERROR, on_connect_error),
    (EVENT_RECONNECT_ATTEMPT, on_reconnect_attempt),
    (EVENT_RECONNECT_ERROR, on_reconnect_error),
    (EVENT_RECONNECT_FAILED, on_reconnect_failed),
    (EVENT_DISCONNECT, on_disconnected),
    (EVENT_AUTHENTICATION, on_authentication),
    (EVENT_RESPONSE, on_response),
    (EVENT_TRANSCRIPT, on_transcript),
    (EVENT_ERROR, on_timeout),
    (EVENT_ERROR, on_event_error),
];

// ============================================================================
// HandlerState
// ============================================================================

/// Everything a handler may touch.
#[derive(Debug)]
pub(crate) struct HandlerState {
    /// Configuration the connection was created with.
    pub(crate) config: SessionConfig,
    /// The connection, for emitting `authenticate`.
    pub(crate) transport: Weak<dyn Transport>,
    /// Delivery channel to the dispatcher.
    pub(crate) deliveries: DeliverySender,
    /// Consumer registration, checked before enqueueing.
    pub(crate) consumer: ConsumerSlot,
}

impl HandlerState {
    /// Enqueues `delivery` if a consumer is registered.
    ///
    /// Without a consumer the delivery is dropped, not held for later.
    fn deliver(&self, delivery: Delivery) {
        if !self.consumer.is_set() {
            warn!(kind = delivery.kind(), "No consumer registered, dropping result");
            return;
        }

        if self.deliveries.send(delivery).is_err() {
            debug!("Dispatcher dropped, discarding result");
        }
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Registers every listener in [`LISTENERS`] on `emitter`.
pub(crate) fn register_all(emitter: &Emitter, state: &Arc<HandlerState>) -> Registrations {
    LISTENERS
        .iter()
        .map(|&(event, handler)| {
            let state = Arc::clone(state);
            let id = emitter.on(
                event,
                Arc::new(move |payload: &Payload| handler(&state, payload)),
            );
            (event, id)
        })
        .collect()
}

/// Removes the listeners returned by [`register_all`].
pub(crate) fn unregister_all(emitter: &Emitter, registrations: &mut Registrations) {
    for (event, id) in registrations.drain(..) {
        emitter.off(event, id);
    }
}

/// Removes every listener except `disconnect`, which stays to report the
/// close the transport is about to perform.
///
/// The remaining listener is released with the transport's emitter.
pub(crate) fn unregister_for_close(emitter: &Emitter, registrations: &mut Registrations) {
    registrations.retain(|&(event, id)| {
        if event == EVENT_DISCONNECT {
            return true;
        }
        emitter.off(event, id);
        false
    });
}

// ============================================================================
// Lifecycle Handlers
// ============================================================================

/// Sends the session credentials.
pub(crate) fn on_connected(state: &HandlerState, _payload: &Payload) {
    info!(address = %state.config.address(), "Connected, authenticating");

    let Some(transport) = state.transport.upgrade() else {
        debug!("Connection already discarded, skipping authenticate");
        return;
    };

    let event = OutboundEvent::authenticate(&state.config.username, &state.config.password);
    if let Err(e) = transport.emit(event) {
        warn!(error = %e, "Failed to send authenticate");
    }
}

pub(crate) fn on_connect_error(state: &HandlerState, payload: &Payload) {
    let reason = payload.reason().unwrap_or_else(|| "no reason received".to_string());
    error!(
        address = %state.config.address(),
        reason = %reason,
        "Error while trying to connect; is the processing server running and reachable?"
    );
}

pub(crate) fn on_reconnect_attempt(_state: &HandlerState, payload: &Payload) {
    info!(attempt = ?payload.reason(), "Reconnecting");
}

pub(crate) fn on_reconnect_error(_state: &HandlerState, payload: &Payload) {
    warn!(reason = ?payload.reason(), "Reconnection attempt failed");
}

/// Tells the consumer the session is gone.
pub(crate) fn on_reconnect_failed(state: &HandlerState, payload: &Payload) {
    error!(reason = ?payload.reason(), "Reconnection gave up");
    state.deliver(Delivery::Connected(false));
}

pub(crate) fn on_disconnected(_state: &HandlerState, payload: &Payload) {
    info!(reason = ?payload.reason(), "Disconnected from server");
}

pub(crate) fn on_timeout(_state: &HandlerState, payload: &Payload) {
    if payload.reason().as_deref() == Some(TIMEOUT_REASON) {
        warn!("Connection timed out");
    }
}

pub(crate) fn on_event_error(_state: &HandlerState, payload: &Payload) {
    let reason = payload.reason().unwrap_or_default();
    if reason != TIMEOUT_REASON {
        warn!(reason = %reason, "Event error");
    }
}

// ============================================================================
// Application Handlers
// ============================================================================

pub(crate) fn on_authentication(state: &HandlerState, payload: &Payload) {
    match InboundEvent::parse(EVENT_AUTHENTICATION, payload) {
        Ok(Some(InboundEvent::Authentication(success))) => {
            info!(success, "Authentication result");
            state.deliver(Delivery::Connected(success));
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Ignoring malformed authentication reply"),
    }
}

/// Delivers whatever fields of the response were readable.
pub(crate) fn on_response(state: &HandlerState, payload: &Payload) {
    let response = ServerResponse::from_payload(payload);
    debug!(result = %response.result, is_gloss = response.is_gloss, "Response received");
    state.deliver(Delivery::Response(response));
}

pub(crate) fn on_transcript(state: &HandlerState, payload: &Payload) {
    match InboundEvent::parse(EVENT_TRANSCRIPT, payload) {
        Ok(Some(InboundEvent::Transcript(text))) => {
            debug!(chars = text.len(), "Transcript received");
            state.deliver(Delivery::Transcript(text));
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Ignoring malformed transcript"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::client::consumer::tests::RecordingConsumer;

    fn state(
        transport: Weak<dyn Transport>,
    ) -> (Arc<HandlerState>, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = HandlerState {
            config: SessionConfig::new("alice", "pw", "127.0.0.1", 9000),
            transport,
            deliveries: tx,
            consumer: ConsumerSlot::default(),
        };
        (Arc::new(state), rx)
    }

    fn detached() -> Weak<dyn Transport> {
        Weak::<crate::transport::EventSocket>::new()
    }

    #[test]
    fn test_table_covers_listener_set() {
        let events: Vec<&str> = LISTENERS.iter().map(|(event, _)| *event).collect();
        for event in [
            "connect",
            "connect_error",
            "reconnect_attempt",
            "reconnect_error",
            "reconnect_failed",
            "disconnect",
            "onAuthentication",
            "onResponse",
            "onTranscriptGenerated",
        ] {
            assert_eq!(events.iter().filter(|e| **e == event).count(), 1, "{event}");
        }
        assert_eq!(events.iter().filter(|e| **e == "error").count(), 2);
    }

    #[test]
    fn test_register_and_unregister_all() {
        let emitter = Emitter::new();
        let (state, _rx) = state(detached());

        let mut registrations = register_all(&emitter, &state);
        assert_eq!(registrations.len(), LISTENERS.len());
        assert_eq!(emitter.listener_count("error"), 2);

        unregister_all(&emitter, &mut registrations);
        assert!(registrations.is_empty());
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_unregister_for_close_keeps_disconnect() {
        let emitter = Emitter::new();
        let (state, _rx) = state(detached());

        let mut registrations = register_all(&emitter, &state);
        unregister_for_close(&emitter, &mut registrations);

        assert_eq!(registrations.len(), 1);
        assert_eq!(emitter.listener_count(EVENT_DISCONNECT), 1);
        assert_eq!(emitter.listener_count(EVENT_CONNECT), 0);
        assert_eq!(emitter.listener_count("error"), 0);
        assert_eq!(emitter.emit(EVENT_DISCONNECT, &Payload::text("io client disconnect")), 1);
    }

    #[test]
    fn test_authentication_without_consumer_is_dropped() {
        let (state, mut rx) = state(detached());
        on_authentication(&state, &Payload::new(vec![json!(true)]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_authentication_enqueued_with_consumer() {
        let (state, mut rx) = state(detached());
        state.consumer.set(Arc::new(RecordingConsumer::default()));

        on_authentication(&state, &Payload::new(vec![json!(false)]));
        assert_eq!(rx.try_recv().ok(), Some(Delivery::Connected(false)));
    }

    #[test]
    fn test_malformed_authentication_ignored() {
        let (state, mut rx) = state(detached());
        state.consumer.set(Arc::new(RecordingConsumer::default()));

        on_authentication(&state, &Payload::new(vec![json!({"ok": 1})]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_partial_response_enqueued() {
        let (state, mut rx) = state(detached());
        state.consumer.set(Arc::new(RecordingConsumer::default()));

        on_response(&state, &Payload::new(vec![json!({"result": "A", "isGloss": "yes"})]));
        assert_eq!(
            rx.try_recv().ok(),
            Some(Delivery::Response(ServerResponse {
                result: "A".into(),
                is_gloss: false,
            }))
        );
    }

    #[test]
    fn test_reconnect_failed_reports_disconnected() {
        let (state, mut rx) = state(detached());
        state.consumer.set(Arc::new(RecordingConsumer::default()));

        on_reconnect_failed(&state, &Payload::text("gave up"));
        assert_eq!(rx.try_recv().ok(), Some(Delivery::Connected(false)));
    }

    #[test]
    fn test_connected_without_transport_is_noop() {
        let (state, mut rx) = state(detached());
        on_connected(&state, &Payload::empty());
        assert!(rx.try_recv().is_err());
    }
}
