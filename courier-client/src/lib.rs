//! # courier-client
//!
//! Client library for the Courier named-endpoint relay.
//!
//! This is the library that consumers (CLI, GUI, dashboards) use to talk
//! to a relay.
//!
//! ## Features
//!
//! - **Implicit declaration**: the endpoint name is declared as soon as the
//!   transport opens
//! - **Automatic protocol replies**: heartbeat pongs and delivery
//!   acknowledgments are sent without application involvement
//! - **Observer injection**: inbound traffic is handed to a
//!   [`SessionObserver`] supplied at construction
//! - **Transport Abstraction**: Pluggable transport layer (WebSocket, mock)
//!
//! ## Example
//!
//! ```ignore
//! use courier_client::{ClientConfig, RelayClient, WebSocketTransport};
//!
//! let config = ClientConfig::new("ws://127.0.0.1:8765", "alice");
//! let client = RelayClient::new(config, WebSocketTransport::new(), observer);
//!
//! client.connect().await?;
//! client.send("hello", "bob").await?;
//! client.run().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod observer;
pub mod transport;

pub use client::{ClientConfig, ClientError, RelayClient};
pub use courier_core::{SessionEvent, SessionState};
pub use observer::{ChannelObserver, SessionObserver};
pub use transport::{MockTransport, Transport, TransportError, WebSocketTransport};
