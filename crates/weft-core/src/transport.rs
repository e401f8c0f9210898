//! Transport abstraction for framed byte streams.
//!
//! The link sits on top of a reliable, length-delimited frame transport.
//! The trait models QUIC/TCP-style connections that have been wrapped in
//! a framing layer elsewhere: the link never sees partial frames, only
//! whole ones, and never retransmits.
//!
//! # Concurrency
//!
//! All methods take `&self` because one handle is shared by two tasks:
//! the sender worker calls [`send`](Transport::send) and
//! [`flush`](Transport::flush) while the receiver worker sits in
//! [`recv`](Transport::recv). Implementations must keep the two halves
//! independent, the way a socket's read and write directions are.
//!
//! # Deadlines
//!
//! [`set_deadline`](Transport::set_deadline) is the only cancellation
//! primitive the link has. `Link::close` arms it before asking the
//! workers to wind down, so any I/O they are blocked in fails with
//! `TimedOut` once the grace period runs out. Implementations must apply
//! the deadline to operations that are already blocked, not only to
//! future ones.

use std::io;

use async_trait::async_trait;
use tokio::time::Instant;

/// A reliable, length-delimited, full-duplex frame transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queue one frame for transmission. Zero-length frames are legal
    /// (close records carry empty payloads).
    ///
    /// # Errors
    ///
    /// Any I/O failure; the frame may or may not have been written.
    async fn send(&self, frame: &[u8]) -> io::Result<()>;

    /// Commit every queued frame to the wire.
    ///
    /// # Errors
    ///
    /// Any I/O failure while draining the write buffer.
    async fn flush(&self) -> io::Result<()>;

    /// Receive the next frame into `buf`, replacing its contents. The
    /// buffer is caller-owned so the hot path can reuse one allocation
    /// per direction.
    ///
    /// # Errors
    ///
    /// Any I/O failure; `UnexpectedEof` once the peer has closed.
    async fn recv(&self, buf: &mut Vec<u8>) -> io::Result<()>;

    /// Arm (or with `None`, clear) an absolute deadline after which
    /// blocked and subsequent I/O fails with `TimedOut`.
    fn set_deadline(&self, deadline: Option<Instant>);

    /// Release the underlying connection.
    ///
    /// # Errors
    ///
    /// Any I/O failure while shutting the connection down.
    async fn close(&self) -> io::Result<()>;
}
