//! Transport abstraction for Courier clients.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` establishes a connection
//! - `send()` transmits one encoded envelope
//! - `recv()` receives one encoded envelope
//! - `close()` gracefully terminates
//!
//! `send()` and `recv()` may run concurrently from different tasks.

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Transport trait for exchanging encoded envelopes with the relay.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the relay at `address` (a `ws://` URL for WebSocket).
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Send one encoded envelope.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive one encoded envelope.
    ///
    /// Blocks until data is available or connection closes.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
