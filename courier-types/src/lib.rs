//! # courier-types
//!
//! Wire format types for the Courier named-endpoint relay.
//!
//! This crate provides the foundational types shared by the relay and its
//! clients:
//! - [`Envelope`] - the unit of exchange, with its JSON codec
//! - [`EnvelopeKind`] - the message type discriminator
//! - [`Payload`], [`MediaKind`] - typed views of the envelope value
//! - [`SystemToken`], [`WarningCode`] - control tokens and warning codes
//! - [`EnvelopeError`] - codec errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod payload;
mod tokens;

pub use envelope::{Envelope, EnvelopeKind, BROADCAST, DEFAULT_RELAY_IDENTITY};
pub use error::EnvelopeError;
pub use payload::{MediaKind, Payload};
pub use tokens::{SystemToken, WarningCode, DECLARATION_RECEIVED};
