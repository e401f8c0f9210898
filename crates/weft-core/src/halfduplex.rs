//! Half-duplex channel state and the per-message crypto framing.
//!
//! Each direction of a link owns one of these units: a counter-mode
//! stream cipher for header confidentiality, a running HMAC for stream
//! integrity, and the scratch buffers the hot path reuses. The factory
//! derives both directions from the handshake's key-derivation stream in
//! a fixed order: the server→client triple first, then client→server, so
//! the two endpoints pair up their in/out states without negotiation.
//!
//! The MAC is deliberately never reset between messages. Its running
//! state chains every message to the full stream prefix, so reordering,
//! insertion, deletion or replay desynchronizes verification at the peer.
//! A variant that wants independent per-message MACs must feed an
//! explicit sequence number into the MAC input instead.

use std::fmt;
use std::io::Read;

use bytes::Bytes;
use cipher::StreamCipher;
use hmac::Mac;
use subtle::ConstantTimeEq;
use tracing::warn;
use weft_proto::{HeaderCodec, Message};

use crate::{LinkError, Suite, Transport};

/// Derive the two directional states for one endpoint.
///
/// Reads 2·(key + IV + salt) bytes from `kdf`; both peers must read the
/// stream in this exact order. `server` decides which derived triple
/// becomes the outbound state.
pub(crate) fn derive<S: Suite, R: Read>(
    kdf: &mut R,
    server: bool,
) -> Result<(SendHalf<S>, RecvHalf<S>), LinkError> {
    let server_to_client = derive_one::<S, R>(kdf)?;
    let client_to_server = derive_one::<S, R>(kdf)?;

    let (out, inbound) = if server {
        (server_to_client, client_to_server)
    } else {
        (client_to_server, server_to_client)
    };
    Ok((SendHalf::new(out), RecvHalf::new(inbound)))
}

/// One direction's primitives: the counter-mode stream and the keyed MAC.
fn derive_one<S: Suite, R: Read>(kdf: &mut R) -> Result<(S::Stream, S::Mac), LinkError> {
    let mut key = vec![0u8; S::KEY_SIZE];
    kdf.read_exact(&mut key).map_err(LinkError::KeyDerivation)?;

    let mut iv = vec![0u8; S::IV_SIZE];
    kdf.read_exact(&mut iv).map_err(LinkError::KeyDerivation)?;
    let stream = S::stream(&key, &iv)?;

    let mut salt = vec![0u8; S::TAG_SIZE];
    kdf.read_exact(&mut salt).map_err(LinkError::KeyDerivation)?;
    let mac = S::mac(&salt)?;

    Ok((stream, mac))
}

/// Outbound channel state. Owned by the sender worker once the link is
/// started; no other task can reach the cipher or MAC.
pub(crate) struct SendHalf<S: Suite> {
    cipher: S::Stream,
    mac: S::Mac,
    buf: Vec<u8>,
}

impl<S: Suite> fmt::Debug for SendHalf<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendHalf").finish_non_exhaustive()
    }
}

impl<S: Suite> SendHalf<S> {
    fn new((cipher, mac): (S::Stream, S::Mac)) -> Self {
        Self { cipher, mac, buf: Vec::new() }
    }

    /// Encrypt the header, chain the MAC and write one message as three
    /// frames: ciphertext header, payload, current MAC digest.
    ///
    /// Refuses non-empty payloads that are not flagged secure before
    /// touching the transport. The MAC state persists across calls; only
    /// the scratch buffer is reset.
    pub(crate) async fn send_direct<T: Transport>(
        &mut self,
        transport: &T,
        codec: &dyn HeaderCodec,
        msg: &Message,
    ) -> Result<(), LinkError> {
        if !msg.secure() && !msg.data.is_empty() {
            warn!("unsecured data, send denied");
            return Err(LinkError::UnsecuredPayload);
        }
        // Flatten and encrypt the header; the stream advances by exactly
        // the header length.
        self.buf.clear();
        codec.encode(&msg.head, &mut self.buf)?;
        self.cipher.apply_keystream(&mut self.buf);

        // Chain the MAC over ciphertext header, then payload.
        self.mac.update(&self.buf);
        self.mac.update(&msg.data);
        let tag = self.mac.clone().finalize().into_bytes();

        transport.send(&self.buf).await?;
        transport.send(&msg.data).await?;
        transport.send(&tag).await?;
        transport.flush().await?;
        Ok(())
    }
}

/// Inbound channel state. Owned by the receiver worker once the link is
/// started.
pub(crate) struct RecvHalf<S: Suite> {
    cipher: S::Stream,
    mac: S::Mac,
    head_buf: Vec<u8>,
    tag_buf: Vec<u8>,
}

impl<S: Suite> fmt::Debug for RecvHalf<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecvHalf").finish_non_exhaustive()
    }
}

impl<S: Suite> RecvHalf<S> {
    fn new((cipher, mac): (S::Stream, S::Mac)) -> Self {
        Self { cipher, mac, head_buf: Vec::new(), tag_buf: Vec::new() }
    }

    /// Read one message (three frames), verify the chained MAC, decrypt
    /// and decode the header, and hand back the message flagged secure.
    ///
    /// A mismatching tag is fatal for the session; the error carries both
    /// digests for diagnostics.
    pub(crate) async fn recv_direct<T: Transport>(
        &mut self,
        transport: &T,
        codec: &dyn HeaderCodec,
    ) -> Result<Message, LinkError> {
        transport.recv(&mut self.head_buf).await?;
        let mut data = Vec::new();
        transport.recv(&mut data).await?;
        transport.recv(&mut self.tag_buf).await?;

        // Chain the MAC before verification; on mismatch the session is
        // torn down, so the desynchronized state never matters.
        self.mac.update(&self.head_buf);
        self.mac.update(&data);
        let digest = self.mac.clone().finalize().into_bytes();
        if !bool::from(digest.as_slice().ct_eq(&self.tag_buf)) {
            return Err(LinkError::MacMismatch {
                have: digest.to_vec(),
                want: self.tag_buf.clone(),
            });
        }

        self.cipher.apply_keystream(&mut self.head_buf);
        let head = codec.decode(&self.head_buf)?;

        let mut msg = Message::new(head, Bytes::from(data));
        msg.mark_secure();
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use weft_proto::{CborCodec, Header, Meta};

    use super::*;
    use crate::{suite::Aes256Sha256, testutil::pipe};

    fn kdf_bytes<S: Suite>() -> Vec<u8> {
        (0..2 * (S::KEY_SIZE + S::IV_SIZE + S::TAG_SIZE)).map(|i| i as u8).collect()
    }

    fn halves(
        server: bool,
    ) -> (SendHalf<Aes256Sha256>, RecvHalf<Aes256Sha256>) {
        let mut kdf = Cursor::new(kdf_bytes::<Aes256Sha256>());
        derive::<Aes256Sha256, _>(&mut kdf, server).expect("derive")
    }

    #[tokio::test]
    async fn opposite_roles_pair_up() {
        let (mut server_out, _) = halves(true);
        let (_, mut client_in) = halves(false);
        let (a, b) = pipe();
        let codec = CborCodec;

        let mut msg = Message::new(Header::new(Meta::None), &b"hello"[..]);
        msg.mark_secure();
        server_out.send_direct(&a, &codec, &msg).await.expect("send");

        let got = client_in.recv_direct(&b, &codec).await.expect("recv");
        assert_eq!(got.data.as_ref(), b"hello");
        assert!(got.secure());
    }

    #[tokio::test]
    async fn matching_roles_fail_the_first_exchange() {
        let (mut server_out, _) = halves(true);
        let (_, mut other_server_in) = halves(true);
        let (a, b) = pipe();
        let codec = CborCodec;

        let msg = Message::control(Meta::None);
        server_out.send_direct(&a, &codec, &msg).await.expect("send");

        let err = other_server_in.recv_direct(&b, &codec).await.unwrap_err();
        assert!(matches!(err, LinkError::MacMismatch { .. }));
    }

    #[tokio::test]
    async fn unsecured_payload_writes_nothing() {
        let (mut out, _) = halves(true);
        let (a, b) = pipe();
        let codec = CborCodec;

        let msg = Message::new(Header::default(), &b"xx"[..]);
        let err = out.send_direct(&a, &codec, &msg).await.unwrap_err();
        assert!(matches!(err, LinkError::UnsecuredPayload));
        assert!(b.is_idle());

        // The channel state is untouched; a secure message still goes
        // through and verifies.
        let (_, mut inbound) = halves(false);
        let mut msg = Message::new(Header::default(), &b"xx"[..]);
        msg.mark_secure();
        out.send_direct(&a, &codec, &msg).await.expect("send");
        let got = inbound.recv_direct(&b, &codec).await.expect("recv");
        assert_eq!(got.data.as_ref(), b"xx");
    }

    #[tokio::test]
    async fn tampered_tag_is_detected() {
        let (mut out, _) = halves(true);
        let (_, mut inbound) = halves(false);
        let (a, b) = pipe();
        let codec = CborCodec;

        let mut msg = Message::new(Header::default(), &b"payload"[..]);
        msg.mark_secure();
        out.send_direct(&a, &codec, &msg).await.expect("send");

        // Flip one bit in the third frame (the tag).
        b.tamper(2, |frame| frame[0] ^= 0x01);

        let err = inbound.recv_direct(&b, &codec).await.unwrap_err();
        match err {
            LinkError::MacMismatch { have, want } => assert_ne!(have, want),
            other => panic!("expected mac mismatch, got {other}"),
        }
    }

    #[test]
    fn short_key_stream_aborts_derivation() {
        let mut kdf = Cursor::new(vec![0u8; 16]);
        let err = derive::<Aes256Sha256, _>(&mut kdf, true).unwrap_err();
        assert!(matches!(err, LinkError::KeyDerivation(_)));
    }
}
