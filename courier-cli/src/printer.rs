//! Terminal rendering of session events.

use courier_client::SessionObserver;
use courier_types::{MediaKind, Payload, SystemToken, DECLARATION_RECEIVED};

/// Observer that prints every event on stdout.
#[derive(Debug, Default)]
pub struct PrintObserver;

impl SessionObserver for PrintObserver {
    fn on_connected(&self, name: &str) {
        println!("* connected as {name}");
    }

    fn on_delivery(
        &self,
        emitter: &str,
        receiver: &str,
        payload: &Payload,
        _media_kind: Option<MediaKind>,
    ) {
        println!("{}", format_delivery(emitter, receiver, payload));
    }

    fn on_warning(&self, text: &str) {
        println!("! {text}");
    }

    fn on_system(&self, token: &SystemToken) {
        if let Some(line) = format_system(token) {
            println!("{line}");
        }
    }

    fn on_disconnected(&self, reason: &str) {
        println!("* disconnected ({reason})");
    }
}

/// One line for an inbound payload. Media is summarized, never dumped.
pub fn format_delivery(emitter: &str, receiver: &str, payload: &Payload) -> String {
    match payload {
        Payload::Text(text) => format!("[{emitter} -> {receiver}] {text}"),
        Payload::Media { kind, data } => {
            format!("[{emitter} -> {receiver}] <{kind}, {} bytes>", data.len())
        }
    }
}

/// One line for a control token; heartbeat traffic prints nothing.
pub fn format_system(token: &SystemToken) -> Option<String> {
    match token {
        SystemToken::Ok => Some("  (relayed)".to_string()),
        SystemToken::MessageReceived => Some("  (received)".to_string()),
        SystemToken::Other(text) if text == DECLARATION_RECEIVED => {
            Some("* declaration received".to_string())
        }
        SystemToken::Ping | SystemToken::Pong => None,
        other => Some(format!("* {}", other.as_str())),
    }
}
