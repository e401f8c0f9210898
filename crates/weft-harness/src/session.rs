//! Session key material for test peers.
//!
//! Both ends of a link must read identical bytes, in identical order,
//! from their key-derivation stream. Production gets that stream from
//! the handshake layer; the harness derives it with HKDF-SHA256 from a
//! shared secret, the same construction the handshake would use.

use std::io::Cursor;

use hkdf::{Hkdf, InvalidLength};
use sha2::Sha256;
use weft_core::Suite;

/// Domain separation for the link's session material.
const EXPAND_INFO: &[u8] = b"weft link session";

/// Expand `secret` into exactly the 2·(key + IV + salt) bytes one link
/// endpoint consumes, as a readable stream.
///
/// Call twice with the same inputs to feed both peers.
///
/// # Errors
///
/// Returns [`InvalidLength`] if the suite's material does not fit in a
/// single HKDF expansion.
pub fn session_keys<S: Suite>(
    secret: &[u8],
    salt: &[u8],
) -> Result<Cursor<Vec<u8>>, InvalidLength> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), secret);
    let mut okm = vec![0u8; 2 * (S::KEY_SIZE + S::IV_SIZE + S::TAG_SIZE)];
    hkdf.expand(EXPAND_INFO, &mut okm)?;
    Ok(Cursor::new(okm))
}
