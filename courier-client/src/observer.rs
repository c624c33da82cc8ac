//! Inbound event observers.
//!
//! A [`SessionObserver`] is handed to [`RelayClient`](crate::RelayClient)
//! at construction and receives every event the session surfaces. Callbacks
//! run on the client's receive task after the protocol replies (pong,
//! `MESSAGE OK`) have been sent, and outside any client lock, so an
//! observer may call back into the client.

use courier_core::SessionEvent;
use courier_types::{MediaKind, Payload, SystemToken};
use tokio::sync::mpsc;

/// Capability interface for consumers of a relay session.
///
/// Every method has a no-op default.
pub trait SessionObserver: Send + Sync {
    /// The transport opened and the name was declared.
    fn on_connected(&self, _name: &str) {}

    /// A peer's payload arrived.
    fn on_delivery(
        &self,
        _emitter: &str,
        _receiver: &str,
        _payload: &Payload,
        _media_kind: Option<MediaKind>,
    ) {
    }

    /// The relay reported a non-fatal error.
    fn on_warning(&self, _text: &str) {}

    /// A control token arrived (`OK`, `message received`, ...).
    fn on_system(&self, _token: &SystemToken) {}

    /// The session ended.
    fn on_disconnected(&self, _reason: &str) {}
}

/// Route a session event to the matching observer callback.
pub(crate) fn dispatch(observer: &dyn SessionObserver, event: &SessionEvent) {
    match event {
        SessionEvent::Connected { name } => observer.on_connected(name),
        SessionEvent::Delivery {
            emitter,
            receiver,
            payload,
        } => observer.on_delivery(emitter, receiver, payload, payload.media_kind()),
        SessionEvent::Warning { text, .. } => observer.on_warning(text),
        SessionEvent::System { token } => observer.on_system(token),
        SessionEvent::Disconnected { reason } => observer.on_disconnected(reason),
    }
}

/// Observer that turns callbacks back into a stream of [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, event: SessionEvent) {
        // Receiver dropped means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_connected(&self, name: &str) {
        self.push(SessionEvent::Connected {
            name: name.to_string(),
        });
    }

    fn on_delivery(
        &self,
        emitter: &str,
        receiver: &str,
        payload: &Payload,
        _media_kind: Option<MediaKind>,
    ) {
        self.push(SessionEvent::Delivery {
            emitter: emitter.to_string(),
            receiver: receiver.to_string(),
            payload: payload.clone(),
        });
    }

    fn on_warning(&self, text: &str) {
        self.push(SessionEvent::Warning {
            text: text.to_string(),
            code: courier_types::WarningCode::from_payload(text),
        });
    }

    fn on_system(&self, token: &SystemToken) {
        self.push(SessionEvent::System {
            token: token.clone(),
        });
    }

    fn on_disconnected(&self, reason: &str) {
        self.push(SessionEvent::Disconnected {
            reason: reason.to_string(),
        });
    }
}
