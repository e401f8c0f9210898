//! Pluggable header codec.
//!
//! The link treats header serialization as an opaque encode/decode step,
//! so the MAC-chain semantics never depend on the encoding in use. Both
//! endpoints must run the same codec; a disagreement surfaces as a decode
//! failure (or, earlier, as a MAC mismatch if the encodings differ in
//! length).
//!
//! The default is CBOR: a compact self-describing tagged encoding that
//! keeps the [`Meta`](crate::Meta) variant discrimination intact across
//! the wire and tolerates header evolution without version negotiation.

use crate::{Header, ProtocolError, Result};

/// Symmetric encode/decode of a [`Header`].
///
/// Implementations must guarantee `decode(encode(h)) == h` for every
/// header, including every [`Meta`](crate::Meta) variant; the receiver
/// relies on that to recognize the close sentinel.
pub trait HeaderCodec: Send + Sync {
    /// Serialize `head` into `dst`. `dst` arrives empty and is reused
    /// across messages by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode(&self, head: &Header, dst: &mut Vec<u8>) -> Result<()>;

    /// Deserialize a header from `src`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] if `src` is not a valid
    /// encoding of a header.
    fn decode(&self, src: &[u8]) -> Result<Header>;
}

/// CBOR header codec, the default for a link.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl HeaderCodec for CborCodec {
    fn encode(&self, head: &Header, dst: &mut Vec<u8>) -> Result<()> {
        ciborium::ser::into_writer(head, dst).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    fn decode(&self, src: &[u8]) -> Result<Header> {
        ciborium::de::from_reader(src).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
