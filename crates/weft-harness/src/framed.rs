//! Length-prefixed framing over a split byte stream.
//!
//! Wraps any `AsyncRead`/`AsyncWrite` pair (a TCP socket's halves, a
//! `tokio::io::duplex` end, whatever) in the frame discipline the link
//! consumes: each frame is a 4-byte big-endian length followed by that
//! many bytes. Zero-length frames are legal; close records and empty
//! payloads produce them.
//!
//! Writes go through a buffer and hit the wire on `flush`, so the three
//! frames of one message are committed together. Reads and writes run
//! under the transport deadline and are independently locked, which makes
//! concurrent use by the link's two workers safe.

use std::io;

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter},
    sync::{Mutex, watch},
    time::Instant,
};
use weft_core::Transport;

use crate::deadline::with_deadline;

/// Largest frame accepted in either direction. Matches the inbound
/// allocation bound: a peer cannot make us reserve more than this from a
/// length prefix.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A framed transport over a split byte stream.
pub struct FramedStream<R, W> {
    reader: Mutex<R>,
    writer: Mutex<BufWriter<W>>,
    deadline: watch::Sender<Option<Instant>>,
}

impl<R, W> FramedStream<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a read half and a write half in the frame discipline.
    pub fn new(reader: R, writer: W) -> Self {
        let (deadline, _) = watch::channel(None);
        Self { reader: Mutex::new(reader), writer: Mutex::new(BufWriter::new(writer)), deadline }
    }
}

#[async_trait]
impl<R, W> Transport for FramedStream<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, frame: &[u8]) -> io::Result<()> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds maximum size"));
        }
        with_deadline(self.deadline.subscribe(), async {
            let mut writer = self.writer.lock().await;
            writer.write_all(&(frame.len() as u32).to_be_bytes()).await?;
            writer.write_all(frame).await
        })
        .await
    }

    async fn flush(&self) -> io::Result<()> {
        with_deadline(self.deadline.subscribe(), async {
            self.writer.lock().await.flush().await
        })
        .await
    }

    async fn recv(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        with_deadline(self.deadline.subscribe(), async {
            let mut reader = self.reader.lock().await;
            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf).await?;
            let len = u32::from_be_bytes(len_buf) as usize;
            if len > MAX_FRAME_SIZE {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "frame exceeds maximum size",
                ));
            }
            buf.clear();
            buf.resize(len, 0);
            reader.read_exact(buf.as_mut_slice()).await?;
            Ok(())
        })
        .await
    }

    fn set_deadline(&self, deadline: Option<Instant>) {
        self.deadline.send_replace(deadline);
    }

    async fn close(&self) -> io::Result<()> {
        self.writer.lock().await.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex, split};

    use super::*;

    type End = FramedStream<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn endpoints() -> (End, End) {
        let (a, b) = duplex(64 * 1024);
        let (ar, aw) = split(a);
        let (br, bw) = split(b);
        (FramedStream::new(ar, aw), FramedStream::new(br, bw))
    }

    #[tokio::test]
    async fn frames_cross_in_order() {
        let (a, b) = endpoints();
        a.send(b"first").await.expect("send");
        a.send(b"second").await.expect("send");
        a.flush().await.expect("flush");

        let mut buf = Vec::new();
        b.recv(&mut buf).await.expect("recv");
        assert_eq!(buf, b"first");
        b.recv(&mut buf).await.expect("recv");
        assert_eq!(buf, b"second");
    }

    #[tokio::test]
    async fn zero_length_frames_are_legal() {
        let (a, b) = endpoints();
        a.send(b"").await.expect("send");
        a.flush().await.expect("flush");

        let mut buf = vec![0xAA; 8];
        b.recv(&mut buf).await.expect("recv");
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (a, b) = endpoints();
        {
            let mut writer = a.writer.lock().await;
            let len = (MAX_FRAME_SIZE as u32) + 1;
            writer.write_all(&len.to_be_bytes()).await.expect("write");
            writer.flush().await.expect("flush");
        }

        let mut buf = Vec::new();
        let err = b.recv(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn deadline_interrupts_a_blocked_recv() {
        let (a, b) = endpoints();
        let b = std::sync::Arc::new(b);

        let receiver = {
            let b = b.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                b.recv(&mut buf).await
            })
        };

        // Arm the deadline only after the recv is already parked.
        tokio::time::sleep(Duration::from_millis(20)).await;
        b.set_deadline(Some(Instant::now() + Duration::from_millis(20)));

        let err = receiver.await.expect("join").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        drop(a);
    }
}
