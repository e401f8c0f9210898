//! The message type exchanged over a link.

use aes::Aes256;
use bytes::Bytes;
use cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use rand::{CryptoRng, RngCore};

use crate::{Header, Meta, ProtocolError, Result};

/// Cipher used for caller-side payload encryption.
type PayloadCipher = Ctr128BE<Aes256>;

const PAYLOAD_KEY_SIZE: usize = 32;
const PAYLOAD_IV_SIZE: usize = 16;

/// A discrete application message: structured header plus byte payload.
///
/// The link refuses to transmit a non-empty payload unless the message is
/// flagged secure, i.e. the bytes in `data` are already ciphertext. The
/// usual way to satisfy that is [`Message::encrypt`], which encrypts the
/// payload with a fresh one-shot key stored in the header (the header
/// itself is encrypted by the link in transit). A message handed out by
/// the link's receive path is flagged secure after MAC verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Structured header; encrypted by the link on the wire
    pub head: Header,

    /// Payload bytes; authenticated but never touched by the link
    pub data: Bytes,

    secure: bool,
}

impl Message {
    /// Create a message with the given header and payload. The payload is
    /// considered insecure until [`encrypt`](Self::encrypt) runs or the
    /// caller asserts otherwise via [`mark_secure`](Self::mark_secure).
    pub fn new(head: Header, data: impl Into<Bytes>) -> Self {
        Self { head, data: data.into(), secure: false }
    }

    /// Create a payload-less control message.
    #[must_use]
    pub fn control(meta: Meta) -> Self {
        Self { head: Header::new(meta), data: Bytes::new(), secure: false }
    }

    /// Whether the payload is known to be ciphertext.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Assert that the payload is ciphertext. The link's receive path
    /// calls this after MAC verification; applications that encrypt by
    /// other means may call it themselves.
    pub fn mark_secure(&mut self) {
        self.secure = true;
    }

    /// Encrypt the payload in place with a fresh AES-256-CTR key and IV,
    /// storing both in the header, and flag the message secure.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadCipher`] if the cipher cannot be
    /// constructed from the generated material.
    pub fn encrypt<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<()> {
        let mut key = vec![0u8; PAYLOAD_KEY_SIZE];
        rng.fill_bytes(&mut key);
        let mut iv = vec![0u8; PAYLOAD_IV_SIZE];
        rng.fill_bytes(&mut iv);

        let mut cipher = PayloadCipher::new_from_slices(&key, &iv)
            .map_err(|e| ProtocolError::PayloadCipher(e.to_string()))?;
        let mut buf = self.data.to_vec();
        cipher.apply_keystream(&mut buf);

        self.data = Bytes::from(buf);
        self.head.key = key;
        self.head.iv = iv;
        self.secure = true;
        Ok(())
    }

    /// Decrypt the payload in place using the key material carried in the
    /// header, then clear that material and the secure flag.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingPayloadKey`] if the header carries
    /// no key, or [`ProtocolError::PayloadCipher`] if the material is
    /// malformed.
    pub fn decrypt(&mut self) -> Result<()> {
        if self.head.key.is_empty() {
            return Err(ProtocolError::MissingPayloadKey);
        }
        let mut cipher = PayloadCipher::new_from_slices(&self.head.key, &self.head.iv)
            .map_err(|e| ProtocolError::PayloadCipher(e.to_string()))?;
        let mut buf = self.data.to_vec();
        cipher.apply_keystream(&mut buf);

        self.data = Bytes::from(buf);
        self.head.key.clear();
        self.head.iv.clear();
        self.secure = false;
        Ok(())
    }
}
