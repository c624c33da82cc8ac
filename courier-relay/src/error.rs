//! Error types for courier-relay.

use courier_types::EnvelopeError;
use tokio_tungstenite::tungstenite;

/// Main error type for courier-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Invalid listen address.
    #[error("invalid address {address}: {source}")]
    Address {
        /// The address as configured.
        address: String,
        /// Parse failure.
        source: std::net::AddrParseError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a single connection.
///
/// None of these affect other connections or the relay process.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// WebSocket upgrade failed.
    #[error("handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),

    /// WebSocket read failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A frame did not decode to a valid envelope.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] EnvelopeError),

    /// A declared name exceeds the configured limit.
    #[error("name too long: {len} bytes (limit: {limit})")]
    NameTooLong {
        /// Length of the offending name.
        len: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The client did not declare in time.
    #[error("no declaration within {0}s")]
    DeclarationTimeout(u64),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
