//! Client session state machine.
//!
//! This module provides a pure, side-effect-free state machine for one
//! endpoint's connection to the relay. It takes events as input and
//! produces a new session plus a list of actions to execute.
//!
//! ```text
//! Connecting ──open──► Declared ──first inbound──► Active
//!                         │                          │
//!                         └──────disconnect──────────┴──► Disconnecting ──closed──► Closed
//! ```
//!
//! Any transport failure moves straight to `Closed`, which is terminal.

use courier_types::{
    Envelope, EnvelopeKind, Payload, SystemToken, WarningCode, DECLARATION_RECEIVED,
    DEFAULT_RELAY_IDENTITY,
};
use thiserror::Error;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not yet open.
    Connecting,
    /// Declaration sent, nothing received yet.
    Declared,
    /// At least one envelope exchanged with the relay.
    Active,
    /// Disconnect sent, waiting for the transport to close.
    Disconnecting,
    /// Terminal.
    Closed,
}

/// Errors for operations the current state does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session has not declared its name yet.
    #[error("session not ready (state: {0:?})")]
    NotReady(SessionState),

    /// The session is closing or closed.
    #[error("session closed")]
    Closed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The transport connection is open.
    TransportOpened,
    /// An envelope arrived from the relay.
    EnvelopeReceived {
        /// The decoded envelope.
        envelope: Envelope,
    },
    /// The application asked to disconnect.
    DisconnectRequested,
    /// The transport closed.
    TransportClosed {
        /// Why it closed.
        reason: String,
    },
    /// The transport failed.
    TransportFailed {
        /// Error description.
        error: String,
    },
}

/// Instructions for the I/O layer.
///
/// These are instructions, not side effects. `courier-client` interprets
/// them and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send an envelope to the relay.
    Send(Envelope),
    /// Close the transport without waiting for a reply.
    CloseTransport,
    /// Hand an event to the application.
    Emit(SessionEvent),
}

/// Events surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport open and declaration sent.
    Connected {
        /// Declared name.
        name: String,
    },
    /// A peer's payload arrived.
    Delivery {
        /// Sending endpoint.
        emitter: String,
        /// Addressed endpoint (this one, or the broadcast token).
        receiver: String,
        /// Decoded payload.
        payload: Payload,
    },
    /// The relay reported a non-fatal error.
    Warning {
        /// Raw warning text.
        text: String,
        /// Code, when the warning carries one.
        code: Option<WarningCode>,
    },
    /// A control token that needs no automatic reply.
    System {
        /// The token.
        token: SystemToken,
    },
    /// The session ended.
    Disconnected {
        /// Why it ended.
        reason: String,
    },
}

/// One endpoint's session with the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    name: String,
    relay_identity: String,
    state: SessionState,
}

impl Session {
    /// Create a session for `name` in the `Connecting` state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relay_identity: DEFAULT_RELAY_IDENTITY.to_string(),
            state: SessionState::Connecting,
        }
    }

    /// Set the name the relay signs its own envelopes with.
    ///
    /// Only a delivery from this emitter can be the declaration receipt.
    pub fn with_relay_identity(mut self, relay_identity: impl Into<String>) -> Self {
        self.relay_identity = relay_identity.into();
        self
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether user sends are accepted.
    pub fn can_send(&self) -> bool {
        matches!(self.state, SessionState::Declared | SessionState::Active)
    }

    /// Build a transfer envelope for an outbound user send.
    ///
    /// Only accepted once the declaration has gone out.
    pub fn compose(&self, receiver: &str, payload: &Payload) -> Result<Envelope, SessionError> {
        match self.state {
            SessionState::Declared | SessionState::Active => {
                Ok(Envelope::transfer(&self.name, receiver, payload))
            }
            SessionState::Connecting => Err(SessionError::NotReady(self.state)),
            SessionState::Disconnecting | SessionState::Closed => Err(SessionError::Closed),
        }
    }

    /// Process an event and return the new session plus actions to execute.
    ///
    /// This is a pure function - no side effects.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        use SessionState::*;

        match (self.state, event) {
            (Closed, _) => (self, vec![]),

            (Connecting, Event::TransportOpened) => {
                let actions = vec![
                    Action::Send(Envelope::declaration(&self.name)),
                    Action::Emit(SessionEvent::Connected {
                        name: self.name.clone(),
                    }),
                ];
                (self.with_state(Declared), actions)
            }

            (Declared | Active, Event::EnvelopeReceived { envelope }) => {
                let actions = self.handle_inbound(&envelope);
                (self.with_state(Active), actions)
            }

            (Declared | Active, Event::DisconnectRequested) => {
                let actions = vec![
                    Action::Send(Envelope::disconnect(&self.name)),
                    Action::CloseTransport,
                ];
                (self.with_state(Disconnecting), actions)
            }
            (Connecting, Event::DisconnectRequested) => (
                self.with_state(Closed),
                vec![
                    Action::CloseTransport,
                    Action::Emit(SessionEvent::Disconnected {
                        reason: "user requested".into(),
                    }),
                ],
            ),

            (Disconnecting, Event::TransportClosed { .. }) => (
                self.with_state(Closed),
                vec![Action::Emit(SessionEvent::Disconnected {
                    reason: "user requested".into(),
                })],
            ),
            (_, Event::TransportClosed { reason }) => (
                self.with_state(Closed),
                vec![Action::Emit(SessionEvent::Disconnected { reason })],
            ),
            (_, Event::TransportFailed { error }) => (
                self.with_state(Closed),
                vec![Action::Emit(SessionEvent::Disconnected { reason: error })],
            ),

            // Invalid transitions - stay in current state
            (_, _) => (self, vec![]),
        }
    }

    fn with_state(mut self, state: SessionState) -> Self {
        self.state = state;
        self
    }

    fn handle_inbound(&self, envelope: &Envelope) -> Vec<Action> {
        let value = envelope.payload().unwrap_or_default();

        match envelope.kind() {
            EnvelopeKind::SystemControl => match SystemToken::parse(value) {
                SystemToken::Ping => vec![Action::Send(Envelope::pong(&self.name))],
                token => vec![Action::Emit(SessionEvent::System { token })],
            },
            EnvelopeKind::Delivery
                if value == DECLARATION_RECEIVED && envelope.emitter() == self.relay_identity =>
            {
                vec![Action::Emit(SessionEvent::System {
                    token: SystemToken::Other(DECLARATION_RECEIVED.to_string()),
                })]
            }
            EnvelopeKind::Delivery => {
                let payload =
                    Payload::parse(value).unwrap_or_else(|_| Payload::Text(value.to_string()));
                vec![
                    Action::Emit(SessionEvent::Delivery {
                        emitter: envelope.emitter().to_string(),
                        receiver: envelope.receiver().to_string(),
                        payload,
                    }),
                    Action::Send(Envelope::message_ok(&self.name, envelope.emitter())),
                ]
            }
            EnvelopeKind::Warning => vec![Action::Emit(SessionEvent::Warning {
                text: value.to_string(),
                code: WarningCode::from_payload(value),
            })],
            EnvelopeKind::Declaration | EnvelopeKind::Transfer => vec![],
        }
    }
}
