//! Deadline plumbing shared by the harness transports.

use std::{future::Future, io};

use tokio::{sync::watch, time::Instant};

fn expired() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "transport deadline exceeded")
}

/// Race `fut` against the transport deadline published on `rx`.
///
/// The deadline can be armed, moved or cleared while `fut` is already
/// blocked; each change re-enters the race. That is what lets a link's
/// `close` cut loose a worker that was parked in I/O long before the
/// deadline existed.
pub(crate) async fn with_deadline<F, T>(
    mut rx: watch::Receiver<Option<Instant>>,
    fut: F,
) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    tokio::pin!(fut);
    loop {
        let deadline = *rx.borrow_and_update();
        match deadline {
            Some(at) => {
                tokio::select! {
                    res = &mut fut => return res,
                    _ = tokio::time::sleep_until(at) => return Err(expired()),
                    changed = rx.changed() => {
                        if changed.is_err() {
                            // Publisher is gone; the deadline is final.
                            tokio::select! {
                                res = &mut fut => return res,
                                _ = tokio::time::sleep_until(at) => return Err(expired()),
                            }
                        }
                    }
                }
            }
            None => {
                tokio::select! {
                    res = &mut fut => return res,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return fut.await;
                        }
                    }
                }
            }
        }
    }
}
