//! Control tokens carried by `sys_message` envelopes, and warning codes.

use std::fmt;

/// Payload of the relay's reply to a declaration.
pub const DECLARATION_RECEIVED: &str = "Declaration received";

/// Token carried in the value of a `sys_message` envelope.
///
/// Relay receipt ([`SystemToken::Ok`]) and application-level receipt
/// ([`SystemToken::MessageReceived`]) are distinct acknowledgment layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SystemToken {
    /// Heartbeat probe from the relay.
    Ping,
    /// Heartbeat answer from a client.
    Pong,
    /// Graceful disconnect request from a client.
    Disconnect,
    /// The relay accepted a transfer.
    Ok,
    /// A client processed a delivery (sent by the receiver).
    MessageOk,
    /// The receiver processed a delivery (forwarded to the sender).
    MessageReceived,
    /// Any other token.
    Other(String),
}

impl SystemToken {
    /// Parse a raw token, accepting the legacy spellings.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ping" | "**ping**" => SystemToken::Ping,
            "pong" | "**pong**" => SystemToken::Pong,
            "Disconnect" => SystemToken::Disconnect,
            "OK" => SystemToken::Ok,
            "MESSAGE OK" => SystemToken::MessageOk,
            "message received" | "message recu" => SystemToken::MessageReceived,
            other => SystemToken::Other(other.to_string()),
        }
    }

    /// Canonical wire spelling.
    pub fn as_str(&self) -> &str {
        match self {
            SystemToken::Ping => "ping",
            SystemToken::Pong => "pong",
            SystemToken::Disconnect => "Disconnect",
            SystemToken::Ok => "OK",
            SystemToken::MessageOk => "MESSAGE OK",
            SystemToken::MessageReceived => "message received",
            SystemToken::Other(raw) => raw,
        }
    }
}

impl fmt::Display for SystemToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enumerable code attached to a `warning` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    /// E40: the addressed receiver is not registered.
    ReceiverNotFound,
    /// E41: the connection has not declared a name.
    NotDeclared,
    /// E42: the connection exceeded its message rate.
    RateLimited,
}

impl WarningCode {
    /// Short code, e.g. `E40`.
    pub fn code(self) -> &'static str {
        match self {
            WarningCode::ReceiverNotFound => "E40",
            WarningCode::NotDeclared => "E41",
            WarningCode::RateLimited => "E42",
        }
    }

    /// Human-readable text.
    pub fn text(self) -> &'static str {
        match self {
            WarningCode::ReceiverNotFound => "Receiver not found",
            WarningCode::NotDeclared => "Not declared",
            WarningCode::RateLimited => "Rate limited",
        }
    }

    /// Wire payload: `[E40] Receiver not found`.
    pub fn payload(self) -> String {
        format!("[{}] {}", self.code(), self.text())
    }

    /// Recover the code from a warning payload, if it carries one.
    pub fn from_payload(payload: &str) -> Option<Self> {
        let code = payload.strip_prefix('[')?.split(']').next()?;
        match code {
            "E40" => Some(WarningCode::ReceiverNotFound),
            "E41" => Some(WarningCode::NotDeclared),
            "E42" => Some(WarningCode::RateLimited),
            _ => None,
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_spellings_parse() {
        assert_eq!(SystemToken::parse("**ping**"), SystemToken::Ping);
        assert_eq!(SystemToken::parse("**pong**"), SystemToken::Pong);
        assert_eq!(SystemToken::parse("message recu"), SystemToken::MessageReceived);
    }

    #[test]
    fn canonical_tokens_roundtrip() {
        for token in [
            SystemToken::Ping,
            SystemToken::Pong,
            SystemToken::Disconnect,
            SystemToken::Ok,
            SystemToken::MessageOk,
            SystemToken::MessageReceived,
        ] {
            assert_eq!(SystemToken::parse(token.as_str()), token);
        }
    }

    #[test]
    fn acknowledgment_layers_are_distinct() {
        assert_ne!(SystemToken::parse("OK"), SystemToken::parse("message received"));
        assert_ne!(SystemToken::parse("OK"), SystemToken::parse("MESSAGE OK"));
    }

    #[test]
    fn unknown_token_is_preserved() {
        assert_eq!(
            SystemToken::parse("reboot"),
            SystemToken::Other("reboot".into())
        );
        assert_eq!(SystemToken::parse("reboot").as_str(), "reboot");
    }

    #[test]
    fn warning_payload_format() {
        assert_eq!(
            WarningCode::ReceiverNotFound.payload(),
            "[E40] Receiver not found"
        );
        assert!(WarningCode::ReceiverNotFound.payload().contains("not found"));
    }

    #[test]
    fn warning_code_recovered_from_payload() {
        for code in [
            WarningCode::ReceiverNotFound,
            WarningCode::NotDeclared,
            WarningCode::RateLimited,
        ] {
            assert_eq!(WarningCode::from_payload(&code.payload()), Some(code));
        }
        assert_eq!(WarningCode::from_payload("Erreur: destinataire"), None);
        assert_eq!(WarningCode::from_payload("[E99] nope"), None);
    }
}
