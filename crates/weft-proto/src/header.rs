//! Structured message header.

use serde::{Deserialize, Serialize};

use crate::Meta;

/// Structured header of a [`Message`](crate::Message).
///
/// The link encrypts the serialized header in transit, so the payload key
/// material stored here is confidential on the wire. Apart from the
/// [`Meta`] slot, the link never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Control record slot, inspected by the link for the close sentinel
    pub meta: Meta,

    /// Per-message payload cipher key; empty unless the payload was
    /// encrypted via [`Message::encrypt`](crate::Message::encrypt)
    pub key: Vec<u8>,

    /// Counter-mode IV matching `key`
    pub iv: Vec<u8>,
}

impl Header {
    /// Create a header carrying the given control record and no payload
    /// key material.
    #[must_use]
    pub fn new(meta: Meta) -> Self {
        Self { meta, key: Vec::new(), iv: Vec::new() }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(Meta::None)
    }
}
