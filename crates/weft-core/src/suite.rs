//! Session cipher suites.
//!
//! A [`Suite`] bundles the two primitives a half-duplex channel needs:
//! the block cipher run in counter mode (header confidentiality) and the
//! keyed hash behind the chained HMAC (stream integrity). Both endpoints
//! of a link must construct it with the same suite; a disagreement shows
//! up as a MAC mismatch on the very first message.

use aes::{Aes128, Aes256};
use cipher::{InvalidLength, KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// The configured session cipher (and key length) plus session hash.
pub trait Suite: Send + Sync + 'static {
    /// Counter-mode stream over the session block cipher
    type Stream: StreamCipher + Send + 'static;

    /// Keyed MAC over the session hash
    type Mac: Mac + Clone + Send + 'static;

    /// Session cipher key length in bytes
    const KEY_SIZE: usize;

    /// Counter-mode IV length in bytes (one cipher block)
    const IV_SIZE: usize;

    /// MAC digest (and salt) length in bytes
    const TAG_SIZE: usize;

    /// Build the stream cipher from raw key material.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLength`] if `key` or `iv` do not match the
    /// suite's sizes.
    fn stream(key: &[u8], iv: &[u8]) -> Result<Self::Stream, InvalidLength>;

    /// Build the keyed MAC from a raw salt.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLength`] if the salt is unusable as an HMAC key.
    fn mac(salt: &[u8]) -> Result<Self::Mac, InvalidLength>;
}

/// AES-256-CTR with HMAC-SHA-256, the default suite.
#[derive(Debug, Clone, Copy)]
pub struct Aes256Sha256;

impl Suite for Aes256Sha256 {
    type Stream = Ctr128BE<Aes256>;
    type Mac = Hmac<Sha256>;

    const KEY_SIZE: usize = 32;
    const IV_SIZE: usize = 16;
    const TAG_SIZE: usize = 32;

    fn stream(key: &[u8], iv: &[u8]) -> Result<Self::Stream, InvalidLength> {
        Self::Stream::new_from_slices(key, iv)
    }

    fn mac(salt: &[u8]) -> Result<Self::Mac, InvalidLength> {
        <Self::Mac as Mac>::new_from_slice(salt)
    }
}

/// AES-128-CTR with HMAC-SHA-256, for deployments that want the shorter
/// session key.
#[derive(Debug, Clone, Copy)]
pub struct Aes128Sha256;

impl Suite for Aes128Sha256 {
    type Stream = Ctr128BE<Aes128>;
    type Mac = Hmac<Sha256>;

    const KEY_SIZE: usize = 16;
    const IV_SIZE: usize = 16;
    const TAG_SIZE: usize = 32;

    fn stream(key: &[u8], iv: &[u8]) -> Result<Self::Stream, InvalidLength> {
        Self::Stream::new_from_slices(key, iv)
    }

    fn mac(salt: &[u8]) -> Result<Self::Mac, InvalidLength> {
        <Self::Mac as Mac>::new_from_slice(salt)
    }
}
