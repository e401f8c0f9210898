//! In-memory paired transports.
//!
//! Two endpoints cross-connected over unbounded frame channels: what one
//! sends, the other receives, in order, with no real I/O underneath.
//! [`pair_with_tamper`] additionally installs a hook on the first
//! endpoint's outbound frames for fault injection; the integrity tests
//! use it to flip single bits in chosen frames.

use std::{
    io,
    sync::{
        Mutex as StdMutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::{
    sync::{Mutex, mpsc, watch},
    time::Instant,
};
use weft_core::Transport;

use crate::deadline::with_deadline;

/// Hook applied to outbound frames: frame index since the start of the
/// connection, plus the mutable frame contents.
pub type TamperFn = Box<dyn Fn(u64, &mut Vec<u8>) + Send + Sync>;

/// One endpoint of an in-memory transport pair.
pub struct MemTransport {
    tx: StdMutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    deadline: watch::Sender<Option<Instant>>,
    tamper: Option<TamperFn>,
    sent: AtomicU64,
}

/// Create a connected transport pair.
pub fn pair() -> (MemTransport, MemTransport) {
    build_pair(None)
}

/// Create a connected transport pair whose **first** endpoint runs every
/// outbound frame through `tamper` before delivery.
pub fn pair_with_tamper(
    tamper: impl Fn(u64, &mut Vec<u8>) + Send + Sync + 'static,
) -> (MemTransport, MemTransport) {
    build_pair(Some(Box::new(tamper)))
}

fn build_pair(tamper: Option<TamperFn>) -> (MemTransport, MemTransport) {
    let (ab_tx, ab_rx) = mpsc::unbounded_channel();
    let (ba_tx, ba_rx) = mpsc::unbounded_channel();
    let (deadline_a, _) = watch::channel(None);
    let (deadline_b, _) = watch::channel(None);

    let a = MemTransport {
        tx: StdMutex::new(Some(ab_tx)),
        rx: Mutex::new(ba_rx),
        deadline: deadline_a,
        tamper,
        sent: AtomicU64::new(0),
    };
    let b = MemTransport {
        tx: StdMutex::new(Some(ba_tx)),
        rx: Mutex::new(ab_rx),
        deadline: deadline_b,
        tamper: None,
        sent: AtomicU64::new(0),
    };
    (a, b)
}

#[async_trait]
impl Transport for MemTransport {
    async fn send(&self, frame: &[u8]) -> io::Result<()> {
        let mut frame = frame.to_vec();
        let index = self.sent.fetch_add(1, Ordering::Relaxed);
        if let Some(tamper) = &self.tamper {
            tamper(index, &mut frame);
        }

        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        };
        tx.send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"))
    }

    async fn flush(&self) -> io::Result<()> {
        // Frames are committed on send; nothing is buffered locally.
        Ok(())
    }

    async fn recv(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        with_deadline(self.deadline.subscribe(), async {
            let frame = self.rx.lock().await.recv().await.ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed")
            })?;
            buf.clear();
            buf.extend_from_slice(&frame);
            Ok(())
        })
        .await
    }

    fn set_deadline(&self, deadline: Option<Instant>) {
        self.deadline.send_replace(deadline);
    }

    async fn close(&self) -> io::Result<()> {
        // Dropping the sender is the EOF signal for the peer.
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}
