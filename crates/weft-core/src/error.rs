//! Error types for the link core.
//!
//! Only [`LinkError::UnsecuredPayload`] leaves the session usable: the
//! offending message is dropped and traffic continues. Every other kind
//! tears the session down, and `Link::close` surfaces the first one that
//! was observed.

use std::io;

use thiserror::Error;
use weft_proto::ProtocolError;

/// Errors raised by link construction and traffic.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Caller attempted to send a non-empty payload without the secure
    /// flag; nothing was written to the transport
    #[error("unsecured data, send denied")]
    UnsecuredPayload,

    /// Header encode/decode failure
    #[error("header codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// I/O failure from the underlying stream
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Inbound integrity violation; both digests are kept for diagnostics
    #[error("mac mismatch: have {have:02x?}, want {want:02x?}")]
    MacMismatch {
        /// Digest computed over the received stream
        have: Vec<u8>,
        /// Tag the peer transmitted
        want: Vec<u8>,
    },

    /// The shared key-derivation stream ran short; link construction is
    /// aborted, there is no runtime recovery
    #[error("session key derivation failed: {0}")]
    KeyDerivation(#[source] io::Error),

    /// Session cipher or MAC rejected the derived key material
    #[error("session cipher setup failed: {0}")]
    CipherSetup(#[from] cipher::InvalidLength),

    /// Direct send/receive was attempted after `start` moved the channel
    /// states into the workers
    #[error("link already in channel mode")]
    ChannelMode,
}
