//! In-memory transport pair for unit tests.

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::{
    sync::{Notify, watch},
    time::Instant,
};

use crate::Transport;

struct Shared {
    frames: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

/// One endpoint of an in-memory frame pipe. Frames are delivered in
/// order and never dropped; a receive blocked past the configured
/// deadline fails with `TimedOut`.
pub(crate) struct Pipe {
    out: Arc<Shared>,
    inc: Arc<Shared>,
    deadline: watch::Sender<Option<Instant>>,
}

/// Create a connected pair of pipe endpoints.
pub(crate) fn pipe() -> (Pipe, Pipe) {
    let ab = Arc::new(Shared { frames: Mutex::new(VecDeque::new()), notify: Notify::new() });
    let ba = Arc::new(Shared { frames: Mutex::new(VecDeque::new()), notify: Notify::new() });
    let (deadline_a, _) = watch::channel(None);
    let (deadline_b, _) = watch::channel(None);
    let a = Pipe { out: ab.clone(), inc: ba.clone(), deadline: deadline_a };
    let b = Pipe { out: ba, inc: ab, deadline: deadline_b };
    (a, b)
}

impl Pipe {
    /// Mutate the frame at `index` in this endpoint's inbound queue.
    pub(crate) fn tamper(&self, index: usize, f: impl FnOnce(&mut Vec<u8>)) {
        let mut frames = self.inc.frames.lock().unwrap();
        f(&mut frames[index]);
    }

    /// Whether nothing is waiting to be received at this endpoint.
    pub(crate) fn is_idle(&self) -> bool {
        self.inc.frames.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl Transport for Pipe {
    async fn send(&self, frame: &[u8]) -> io::Result<()> {
        self.out.frames.lock().unwrap().push_back(frame.to_vec());
        self.out.notify.notify_one();
        Ok(())
    }

    async fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    async fn recv(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        let mut deadline_rx = self.deadline.subscribe();
        loop {
            if let Some(frame) = self.inc.frames.lock().unwrap().pop_front() {
                buf.clear();
                buf.extend_from_slice(&frame);
                return Ok(());
            }
            let notified = self.inc.notify.notified();
            let deadline = *deadline_rx.borrow_and_update();
            match deadline {
                Some(at) => tokio::select! {
                    _ = notified => {}
                    _ = deadline_rx.changed() => {}
                    _ = tokio::time::sleep_until(at) => {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
                    }
                },
                None => tokio::select! {
                    _ = notified => {}
                    _ = deadline_rx.changed() => {}
                },
            }
        }
    }

    fn set_deadline(&self, deadline: Option<Instant>) {
        self.deadline.send_replace(deadline);
    }

    async fn close(&self) -> io::Result<()> {
        Ok(())
    }
}
