//! Error types for the Weft wire protocol.

use thiserror::Error;

/// Errors raised while encoding, decoding or preparing messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header serialization failed
    #[error("failed to encode header: {0}")]
    Encode(String),

    /// Header deserialization failed
    #[error("failed to decode header: {0}")]
    Decode(String),

    /// Payload cipher could not be constructed from the header material
    #[error("payload cipher setup failed: {0}")]
    PayloadCipher(String),

    /// Decrypt was requested but the header carries no key material
    #[error("message carries no payload key material")]
    MissingPayloadKey,
}
