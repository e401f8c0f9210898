//! Wire-level value types for the Weft encrypted message link.
//!
//! This crate defines what travels over a link, not how it travels:
//!
//! - [`Message`]: a structured [`Header`] plus an opaque byte payload
//! - [`Meta`]: the tagged control-record slot inside every header,
//!   including the close sentinel that ends a session
//! - [`HeaderCodec`]: the pluggable header encoding, with a CBOR default
//!
//! Payloads are encrypted by the application before they reach the link
//! ([`Message::encrypt`]); the link itself only encrypts headers and
//! authenticates the whole stream. Keeping payload encryption out of the
//! link avoids serializing all traffic through the link's cipher state.

#![forbid(unsafe_code)]

mod codec;
mod errors;
mod header;
mod message;
mod meta;

pub use codec::{CborCodec, HeaderCodec};
pub use errors::ProtocolError;
pub use header::Header;
pub use message::Message;
pub use meta::Meta;

/// Convenient Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
