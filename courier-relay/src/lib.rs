//! # courier-relay
//!
//! Named-endpoint WebSocket relay for Courier.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket connections and lets each one declare a name
//! - Routes point-to-point and broadcast (`ALL`) payloads between names
//! - Forwards end-to-end delivery acknowledgments back to senders
//! - Pings every endpoint periodically and evicts the silent ones
//! - Keeps everything in memory (registrations are lost on restart)
//!
//! ## Architecture
//!
//! ```text
//! alice ──┐                         ┌── bob
//!         │        WebSocket        │
//!         ├────────────────────────►│
//!         │                         │
//!     ┌───┴─────────────────────────┴───┐
//!     │          courier-relay          │
//!     │  listener → connection → engine │
//!     │       directory ◄── liveness    │
//!     └─────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! One JSON envelope per text frame:
//! - declaration → "Declaration received"
//! - envoie → reception to the receiver, OK to the sender
//! - sys_message MESSAGE OK → "message received" to the original sender
//! - sys_message ping/pong (heartbeat), Disconnect

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod directory;
pub mod engine;
pub mod error;
pub mod http;
pub mod limits;
pub mod listener;
pub mod liveness;
pub mod server;

pub use config::Config;
pub use directory::{ConnectionHandle, ConnectionId, Directory};
pub use engine::{Flow, RelayEngine};
pub use error::{ConnectionError, RelayError};
pub use listener::RelayListener;
pub use liveness::{spawn_liveness_task, LivenessMonitor};
pub use server::{CourierRelay, RelayMetrics};
