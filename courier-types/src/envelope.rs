//! Envelope - the wire format wrapper for all relay messages.
//!
//! On the wire an envelope is a flat JSON record with a discriminator and a
//! nested data object:
//!
//! ```text
//! {"message_type":"envoie","data":{"emitter":"alice","receiver":"bob","value":"hello"}}
//! ```

use serde::{Deserialize, Serialize};

use crate::{EnvelopeError, Payload, SystemToken, WarningCode, DECLARATION_RECEIVED};

/// Receiver token addressing every registered endpoint.
pub const BROADCAST: &str = "ALL";

/// Emitter name the relay uses for envelopes it originates.
pub const DEFAULT_RELAY_IDENTITY: &str = "SERVER";

/// Message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// Binds the emitter's name to its connection.
    Declaration,
    /// Client-to-client send request.
    Transfer,
    /// Envelope forwarded by the relay to the addressed receiver.
    Delivery,
    /// Heartbeat and acknowledgment traffic.
    SystemControl,
    /// Non-fatal error report.
    Warning,
}

impl EnvelopeKind {
    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::Declaration => "declaration",
            EnvelopeKind::Transfer => "envoie",
            EnvelopeKind::Delivery => "reception",
            EnvelopeKind::SystemControl => "sys_message",
            EnvelopeKind::Warning => "warning",
        }
    }
}

impl TryFrom<&str> for EnvelopeKind {
    type Error = EnvelopeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "declaration" => Ok(EnvelopeKind::Declaration),
            "envoie" => Ok(EnvelopeKind::Transfer),
            "reception" => Ok(EnvelopeKind::Delivery),
            "sys_message" => Ok(EnvelopeKind::SystemControl),
            "warning" => Ok(EnvelopeKind::Warning),
            other => Err(EnvelopeError::malformed(format!(
                "unknown message_type: {other}"
            ))),
        }
    }
}

/// The unit of exchange between endpoints and the relay.
///
/// Envelopes are immutable once built: fields are only readable through
/// accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    kind: EnvelopeKind,
    emitter: String,
    receiver: String,
    payload: Option<String>,
}

#[derive(Serialize)]
struct WireOut<'a> {
    message_type: &'a str,
    data: WireDataOut<'a>,
}

#[derive(Serialize)]
struct WireDataOut<'a> {
    emitter: &'a str,
    receiver: &'a str,
    value: Option<&'a str>,
}

#[derive(Deserialize)]
struct WireIn {
    message_type: Option<String>,
    data: Option<WireDataIn>,
}

#[derive(Deserialize)]
struct WireDataIn {
    emitter: Option<String>,
    #[serde(default)]
    receiver: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

impl Envelope {
    /// Build an envelope from its four fields.
    pub fn new(
        kind: EnvelopeKind,
        emitter: impl Into<String>,
        receiver: impl Into<String>,
        payload: Option<String>,
    ) -> Self {
        Self {
            kind,
            emitter: emitter.into(),
            receiver: receiver.into(),
            payload,
        }
    }

    /// Registration envelope sent by a client on connect.
    pub fn declaration(name: &str) -> Self {
        Self::new(EnvelopeKind::Declaration, name, "", Some(String::new()))
    }

    /// Send request from `emitter` to `receiver`.
    pub fn transfer(emitter: &str, receiver: &str, payload: &Payload) -> Self {
        Self::new(
            EnvelopeKind::Transfer,
            emitter,
            receiver,
            Some(payload.to_wire()),
        )
    }

    /// Envelope forwarded to a receiver.
    pub fn delivery(emitter: &str, receiver: &str, value: &str) -> Self {
        Self::new(
            EnvelopeKind::Delivery,
            emitter,
            receiver,
            Some(value.to_string()),
        )
    }

    /// Relay reply to a declaration.
    pub fn declaration_received(relay: &str, name: &str) -> Self {
        Self::delivery(relay, name, DECLARATION_RECEIVED)
    }

    /// Control envelope carrying `token`.
    pub fn system(emitter: &str, receiver: &str, token: SystemToken) -> Self {
        Self::new(
            EnvelopeKind::SystemControl,
            emitter,
            receiver,
            Some(token.as_str().to_string()),
        )
    }

    /// Heartbeat probe originated by the relay.
    pub fn ping(relay: &str) -> Self {
        Self::system(relay, "", SystemToken::Ping)
    }

    /// Heartbeat answer from `name`.
    pub fn pong(name: &str) -> Self {
        Self::system(name, "", SystemToken::Pong)
    }

    /// Graceful disconnect from `name`.
    pub fn disconnect(name: &str) -> Self {
        Self::system(name, "", SystemToken::Disconnect)
    }

    /// Application-level acknowledgment of a delivery from `original_sender`.
    pub fn message_ok(name: &str, original_sender: &str) -> Self {
        Self::system(name, original_sender, SystemToken::MessageOk)
    }

    /// Warning addressed to `receiver`.
    pub fn warning(emitter: &str, receiver: &str, code: WarningCode) -> Self {
        Self::new(EnvelopeKind::Warning, emitter, receiver, Some(code.payload()))
    }

    /// Message type discriminator.
    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    /// Name of the originating endpoint.
    pub fn emitter(&self) -> &str {
        &self.emitter
    }

    /// Name of the target endpoint, [`BROADCAST`], or empty.
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// Raw wire value, if any.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Whether this envelope is addressed to every endpoint.
    pub fn is_broadcast(&self) -> bool {
        self.receiver == BROADCAST
    }

    /// Control token, for `sys_message` envelopes.
    pub fn system_token(&self) -> Option<SystemToken> {
        match self.kind {
            EnvelopeKind::SystemControl => self.payload.as_deref().map(SystemToken::parse),
            _ => None,
        }
    }

    /// Check that required fields are present and the payload fits the kind.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        match self.kind {
            EnvelopeKind::Declaration => {
                if self.emitter.is_empty() {
                    return Err(EnvelopeError::malformed("declaration without emitter name"));
                }
                if self.emitter == BROADCAST {
                    return Err(EnvelopeError::malformed("broadcast token cannot be declared"));
                }
            }
            EnvelopeKind::Transfer => {
                let value = self
                    .payload
                    .as_deref()
                    .ok_or_else(|| EnvelopeError::malformed("transfer without value"))?;
                Payload::parse(value)?;
            }
            EnvelopeKind::SystemControl => match self.payload.as_deref() {
                Some(token) if !token.is_empty() => {}
                _ => return Err(EnvelopeError::malformed("sys_message without token")),
            },
            EnvelopeKind::Delivery | EnvelopeKind::Warning => {}
        }
        Ok(())
    }

    /// Serialize to JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        self.validate()?;
        let wire = WireOut {
            message_type: self.kind.as_str(),
            data: WireDataOut {
                emitter: &self.emitter,
                receiver: &self.receiver,
                value: self.payload.as_deref(),
            },
        };
        serde_json::to_vec(&wire).map_err(EnvelopeError::Serialization)
    }

    /// Serialize to a JSON string (one WebSocket text frame).
    pub fn encode_text(&self) -> Result<String, EnvelopeError> {
        let bytes = self.encode()?;
        String::from_utf8(bytes).map_err(|e| EnvelopeError::malformed(e.to_string()))
    }

    /// Deserialize from JSON bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let wire: WireIn = serde_json::from_slice(bytes)
            .map_err(|e| EnvelopeError::malformed(e.to_string()))?;

        let kind = wire
            .message_type
            .ok_or_else(|| EnvelopeError::malformed("missing message_type"))?;
        let kind = EnvelopeKind::try_from(kind.as_str())?;
        let data = wire
            .data
            .ok_or_else(|| EnvelopeError::malformed("missing data"))?;
        let emitter = data
            .emitter
            .ok_or_else(|| EnvelopeError::malformed("missing emitter"))?;

        let envelope = Self {
            kind,
            emitter,
            receiver: data.receiver.unwrap_or_default(),
            payload: data.value,
        };
        envelope.validate()?;
        Ok(envelope)
    }
}
