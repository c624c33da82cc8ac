//! # courier-core
//!
//! Pure session logic for Courier clients (no I/O, instant tests).
//!
//! The [`Session`] state machine takes transport and application events as
//! input and produces a list of [`Action`]s: envelopes to send, transport
//! closure, and events for the application. It never touches a socket.
//!
//! The actual I/O is performed by `courier-client`, which interprets the
//! actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod session;

pub use session::{Action, Event, Session, SessionError, SessionEvent, SessionState};
