//! Test plumbing for the Weft link.
//!
//! Everything a scenario needs to stand up real links without a real
//! network: framed transports over arbitrary byte streams, an in-memory
//! transport pair with fault injection, HKDF session material, and
//! helpers that wire two endpoints together.

#![forbid(unsafe_code)]

mod deadline;
pub mod framed;
pub mod mem;
pub mod session;

use std::io;

pub use framed::FramedStream;
pub use mem::MemTransport;
pub use session::session_keys;

use weft_core::{Aes256Sha256, Link, LinkConfig, LinkError};

const SECRET: &[u8] = b"weft harness shared secret";
const SALT: &[u8] = b"weft harness salt";

/// Two links joined over an in-memory transport pair, keys derived from
/// a fixed shared secret. The first is the server-role endpoint.
pub fn linked_pair() -> Result<(Link<MemTransport>, Link<MemTransport>), LinkError> {
    linked_pair_with(LinkConfig::default())
}

/// Like [`linked_pair`], with an explicit configuration on both ends.
pub fn linked_pair_with(
    config: LinkConfig,
) -> Result<(Link<MemTransport>, Link<MemTransport>), LinkError> {
    let (a, b) = mem::pair();
    link_up(a, b, config)
}

/// Like [`linked_pair`], but the server endpoint's outbound frames run
/// through `tamper` (see [`mem::pair_with_tamper`]).
pub fn linked_pair_tampered(
    tamper: impl Fn(u64, &mut Vec<u8>) + Send + Sync + 'static,
    config: LinkConfig,
) -> Result<(Link<MemTransport>, Link<MemTransport>), LinkError> {
    let (a, b) = mem::pair_with_tamper(tamper);
    link_up(a, b, config)
}

fn link_up(
    a: MemTransport,
    b: MemTransport,
    config: LinkConfig,
) -> Result<(Link<MemTransport>, Link<MemTransport>), LinkError> {
    let mut server_kdf = session_keys::<Aes256Sha256>(SECRET, SALT).map_err(expand_failure)?;
    let mut client_kdf = session_keys::<Aes256Sha256>(SECRET, SALT).map_err(expand_failure)?;
    let server = Link::with_config(a, &mut server_kdf, true, config.clone())?;
    let client = Link::with_config(b, &mut client_kdf, false, config)?;
    Ok((server, client))
}

fn expand_failure(err: hkdf::InvalidLength) -> LinkError {
    LinkError::KeyDerivation(io::Error::new(io::ErrorKind::InvalidInput, err))
}
