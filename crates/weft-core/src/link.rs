//! The encrypted full-duplex message link.
//!
//! A [`Link`] carries discrete [`Message`]s between two peers that have
//! already authenticated each other and agreed on a key-derivation
//! stream. Headers are encrypted and the whole stream is integrity
//! protected by a chained MAC; payloads are expected to arrive already
//! encrypted (see [`Message::encrypt`]) and are only authenticated here,
//! so bulk payload crypto never serializes through the link's state.
//!
//! # Lifecycle
//!
//! ```text
//! new ──> (send_direct / recv_direct, e.g. during handshake)
//!      ──> start(capacity) ──> channel mode: sender() / take_receiver()
//!      ──> close() ──> drained, close record exchanged, transport shut
//! ```
//!
//! After `start`, exactly one sender task and one receiver task exist and
//! each owns its direction's cipher and MAC state outright; `close` is
//! the only way to tear a started link down. The receive channel closing
//! is the application's end-of-stream signal, and the reason, if any,
//! comes back out of `close`.

use std::{io::Read, sync::Arc};

use tokio::{
    sync::{mpsc, mpsc::error::TrySendError, oneshot},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, warn};
use weft_proto::{CborCodec, HeaderCodec, Message, Meta};

use crate::{
    LinkConfig, LinkError, Suite, Transport,
    halfduplex::{self, RecvHalf, SendHalf},
    suite::Aes256Sha256,
};

/// Reply slot carried by a shutdown request; the worker answers with the
/// first error it observed, if any.
type ReplySlot = oneshot::Sender<Option<LinkError>>;

/// Secure, authenticated full-duplex message channel over a framed
/// transport.
///
/// Generic over the [`Transport`] and the [`Suite`]; defaults to
/// AES-256-CTR with HMAC-SHA-256.
pub struct Link<T: Transport, S: Suite = Aes256Sha256> {
    transport: Arc<T>,
    codec: Arc<dyn HeaderCodec>,
    config: LinkConfig,

    // Directional channel states; taken by `start` and moved into the
    // workers, each owned by exactly one task from then on.
    outbound: Option<SendHalf<S>>,
    inbound: Option<RecvHalf<S>>,

    send: Option<mpsc::Sender<Message>>,
    recv: Option<mpsc::Receiver<Message>>,
    send_quit: Option<mpsc::Sender<ReplySlot>>,
    recv_quit: Option<mpsc::Sender<ReplySlot>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Transport> Link<T> {
    /// Create a link with the default suite, codec and configuration.
    ///
    /// `server` decides the key-derivation order for the two half-duplex
    /// channels: the stream's first derived triple always belongs to the
    /// server→client direction, so opposite roles pair up without any
    /// negotiation.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::KeyDerivation`] if `kdf` cannot supply the
    /// required 2·(key + IV + salt) bytes, or
    /// [`LinkError::CipherSetup`] if the material is rejected.
    pub fn new(transport: T, kdf: &mut impl Read, server: bool) -> Result<Self, LinkError> {
        Self::with_config(transport, kdf, server, LinkConfig::default())
    }
}

impl<T: Transport, S: Suite> Link<T, S> {
    /// Create a link with an explicit configuration (and, via the type
    /// parameter, an explicit suite).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Link::new`].
    pub fn with_config(
        transport: T,
        kdf: &mut impl Read,
        server: bool,
        config: LinkConfig,
    ) -> Result<Self, LinkError> {
        let (outbound, inbound) = halfduplex::derive::<S, _>(kdf, server)?;
        Ok(Self {
            transport: Arc::new(transport),
            codec: Arc::new(CborCodec),
            config,
            outbound: Some(outbound),
            inbound: Some(inbound),
            send: None,
            recv: None,
            send_quit: None,
            recv_quit: None,
            workers: Vec::new(),
        })
    }

    /// Replace the header codec. Both endpoints must agree; call before
    /// any traffic.
    #[must_use]
    pub fn with_codec(mut self, codec: impl HeaderCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Send one message synchronously. Public for handshake traffic;
    /// once the link switches to channel mode this returns
    /// [`LinkError::ChannelMode`].
    ///
    /// # Errors
    ///
    /// [`LinkError::UnsecuredPayload`] leaves the session intact; codec
    /// and transport errors tear it down.
    pub async fn send_direct(&mut self, msg: &Message) -> Result<(), LinkError> {
        let half = self.outbound.as_mut().ok_or(LinkError::ChannelMode)?;
        half.send_direct(self.transport.as_ref(), self.codec.as_ref(), msg).await
    }

    /// Receive one message synchronously. Public for handshake traffic;
    /// once the link switches to channel mode this returns
    /// [`LinkError::ChannelMode`].
    ///
    /// # Errors
    ///
    /// Transport, codec and MAC failures are all fatal for the session.
    pub async fn recv_direct(&mut self) -> Result<Message, LinkError> {
        let half = self.inbound.as_mut().ok_or(LinkError::ChannelMode)?;
        half.recv_direct(self.transport.as_ref(), self.codec.as_ref()).await
    }

    /// Switch to channel mode: allocate the bounded send/receive
    /// channels and spawn the sender and receiver workers. The channel
    /// states move into the workers; direct send/receive is unavailable
    /// from here on.
    pub fn start(&mut self, capacity: usize) {
        let (Some(outbound), Some(inbound)) = (self.outbound.take(), self.inbound.take()) else {
            warn!("link already started");
            return;
        };

        // Bounded channels need at least one slot.
        let capacity = capacity.max(1);
        let (send_tx, send_rx) = mpsc::channel(capacity);
        let (recv_tx, recv_rx) = mpsc::channel(capacity);
        let (send_quit_tx, send_quit_rx) = mpsc::channel(1);
        let (recv_quit_tx, recv_quit_rx) = mpsc::channel(1);

        self.send = Some(send_tx);
        self.recv = Some(recv_rx);
        self.send_quit = Some(send_quit_tx);
        self.recv_quit = Some(recv_quit_tx);

        self.workers.push(tokio::spawn(sender_loop(
            outbound,
            self.transport.clone(),
            self.codec.clone(),
            send_rx,
            send_quit_rx,
        )));
        self.workers.push(tokio::spawn(receiver_loop(
            inbound,
            self.transport.clone(),
            self.codec.clone(),
            recv_tx,
            recv_quit_rx,
        )));
    }

    /// Handle for queueing outbound messages; `None` before `start`.
    #[must_use]
    pub fn sender(&self) -> Option<mpsc::Sender<Message>> {
        self.send.clone()
    }

    /// Take the inbound message channel; `None` before `start` (or if
    /// already taken). The link closes it on termination, so a `recv`
    /// returning `None` is the end-of-stream signal.
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.recv.take()
    }

    /// Tear the link down.
    ///
    /// Arms the transport deadline with the configured grace timeout,
    /// asks the sender to drain and emit the close record, asks the
    /// receiver to stop once upstream delivery allows, joins both
    /// workers, then closes the transport. Safe to call on a link that
    /// was never started; the worker steps are skipped.
    ///
    /// # Errors
    ///
    /// The first error observed among sender, receiver and transport
    /// close; later ones are dropped to preserve the diagnostic.
    pub async fn close(&mut self) -> Result<(), LinkError> {
        let mut res: Option<LinkError> = None;

        // Bound every blocking wait below, including the sender's drain.
        self.transport.set_deadline(Some(Instant::now() + self.config.grace_timeout));

        if let Some(quit) = self.send_quit.take() {
            let (reply_tx, reply_rx) = oneshot::channel();
            if quit.send(reply_tx).await.is_ok() {
                if let Ok(err) = reply_rx.await {
                    res = res.or(err);
                }
            }
        }
        if let Some(quit) = self.recv_quit.take() {
            let (reply_tx, reply_rx) = oneshot::channel();
            if quit.send(reply_tx).await.is_ok() {
                if let Ok(err) = reply_rx.await {
                    res = res.or(err);
                }
            }
        }

        // Both workers must be gone before the transport goes away.
        self.send.take();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }

        if let Err(e) = self.transport.close().await {
            res = res.or(Some(LinkError::Transport(e)));
        }

        debug!(clean = res.is_none(), "link closed");
        match res {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The raw transport handle, for exceptional manipulations.
    #[must_use]
    pub fn sock(&self) -> &T {
        &self.transport
    }
}

/// Moves messages from the send channel into the encrypted stream.
///
/// Runs until an error occurs or shutdown is requested. Shutdown drains
/// whatever is already queued, appends the close record, and reports the
/// outcome through the reply slot. A worker that failed spontaneously
/// parks on the shutdown channel so `close` can still collect the error.
async fn sender_loop<T: Transport, S: Suite>(
    mut half: SendHalf<S>,
    transport: Arc<T>,
    codec: Arc<dyn HeaderCodec>,
    mut send_rx: mpsc::Receiver<Message>,
    mut quit_rx: mpsc::Receiver<ReplySlot>,
) {
    let mut failure: Option<LinkError> = None;
    let mut reply: Option<ReplySlot> = None;

    while failure.is_none() && reply.is_none() {
        tokio::select! {
            req = quit_rx.recv() => match req {
                Some(slot) => reply = Some(slot),
                None => return,
            },
            msg = send_rx.recv() => {
                if let Some(msg) = msg {
                    match half.send_direct(transport.as_ref(), codec.as_ref(), &msg).await {
                        // Refused message is dropped, the session goes on.
                        Ok(()) | Err(LinkError::UnsecuredPayload) => {}
                        Err(e) => failure = Some(e),
                    }
                }
            }
        }
    }

    match reply {
        Some(slot) => {
            // Flush everything already queued, then mark the stream end.
            while failure.is_none() {
                let Ok(msg) = send_rx.try_recv() else { break };
                match half.send_direct(transport.as_ref(), codec.as_ref(), &msg).await {
                    Ok(()) | Err(LinkError::UnsecuredPayload) => {}
                    Err(e) => failure = Some(e),
                }
            }
            if failure.is_none() {
                let close = Message::control(Meta::Close);
                if let Err(e) = half.send_direct(transport.as_ref(), codec.as_ref(), &close).await
                {
                    failure = Some(e);
                }
            }
            let _ = slot.send(failure);
        }
        None => {
            debug!("sender failed, awaiting shutdown");
            if let Some(slot) = quit_rx.recv().await {
                let _ = slot.send(failure);
            }
        }
    }
}

/// Moves messages from the encrypted stream up to the receive channel.
///
/// Exits on the peer's close record, on any receive error, or on a
/// shutdown request while upstream is stalled. Always closes the receive
/// channel on the way out, exactly once, then reports through the reply
/// slot.
async fn receiver_loop<T: Transport, S: Suite>(
    mut half: RecvHalf<S>,
    transport: Arc<T>,
    codec: Arc<dyn HeaderCodec>,
    recv_tx: mpsc::Sender<Message>,
    mut quit_rx: mpsc::Receiver<ReplySlot>,
) {
    let mut failure: Option<LinkError> = None;
    let mut reply: Option<ReplySlot> = None;

    while failure.is_none() && reply.is_none() {
        let msg = match half.recv_direct(transport.as_ref(), codec.as_ref()).await {
            Ok(msg) => msg,
            Err(e) => {
                failure = Some(e);
                continue;
            }
        };
        if msg.head.meta.is_close() {
            debug!("peer closed the session");
            break;
        }

        // Fast path while the application keeps up; otherwise block on
        // delivery but stay receptive to shutdown so a stalled consumer
        // cannot wedge teardown.
        match recv_tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                tokio::select! {
                    sent = recv_tx.send(msg) => {
                        if sent.is_err() {
                            debug!("receive channel dropped, discarding message");
                        }
                    }
                    req = quit_rx.recv() => match req {
                        Some(slot) => reply = Some(slot),
                        None => return,
                    },
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!("receive channel dropped, discarding message");
            }
        }
    }

    // Close the upward stream, then sync termination.
    drop(recv_tx);
    if reply.is_none() {
        match quit_rx.recv().await {
            Some(slot) => reply = Some(slot),
            None => return,
        }
    }
    if let Some(slot) = reply {
        let _ = slot.send(failure);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use weft_proto::Header;

    use super::*;
    use crate::testutil::{Pipe, pipe};

    const KDF_LEN: usize = 2 * (32 + 16 + 32);

    fn kdf() -> Cursor<Vec<u8>> {
        Cursor::new((0..KDF_LEN).map(|i| (i * 7) as u8).collect())
    }

    fn linked_pair() -> (Link<Pipe>, Link<Pipe>) {
        let (a, b) = pipe();
        let server = Link::new(a, &mut kdf(), true).expect("server link");
        let client = Link::new(b, &mut kdf(), false).expect("client link");
        (server, client)
    }

    fn secure(payload: &'static [u8]) -> Message {
        let mut msg = Message::new(Header::default(), payload);
        msg.mark_secure();
        msg
    }

    #[tokio::test]
    async fn direct_exchange_before_channel_mode() {
        let (mut server, mut client) = linked_pair();

        server.send_direct(&secure(b"hello")).await.expect("send");
        let got = client.recv_direct().await.expect("recv");
        assert_eq!(got.data.as_ref(), b"hello");

        client.send_direct(&secure(b"world")).await.expect("send");
        let got = server.recv_direct().await.expect("recv");
        assert_eq!(got.data.as_ref(), b"world");
    }

    #[tokio::test]
    async fn direct_calls_fail_in_channel_mode() {
        let (mut server, _client) = linked_pair();
        server.start(4);

        let err = server.send_direct(&secure(b"late")).await.unwrap_err();
        assert!(matches!(err, LinkError::ChannelMode));
        let err = server.recv_direct().await.unwrap_err();
        assert!(matches!(err, LinkError::ChannelMode));
    }

    #[tokio::test]
    async fn channel_mode_round_trip() {
        let (mut server, mut client) = linked_pair();
        server.start(8);
        client.start(8);

        let tx = server.sender().expect("sender");
        let mut rx = client.take_receiver().expect("receiver");

        for i in 0..32u8 {
            tx.send(secure(b"tick")).await.expect("queue");
            let got = rx.recv().await.expect("deliver");
            assert_eq!(got.data.as_ref(), b"tick", "message {i}");
            assert!(got.secure());
        }

        // Each close record releases the other side's receiver, so the
        // two teardowns have to run concurrently.
        let (server_res, client_res) = tokio::join!(server.close(), client.close());
        server_res.expect("server close");
        client_res.expect("client close");
    }

    #[tokio::test]
    async fn close_delivers_queued_messages_then_ends_stream() {
        let (mut server, mut client) = linked_pair();
        server.start(16);
        client.start(16);

        let tx = server.sender().expect("sender");
        for _ in 0..8 {
            tx.send(secure(b"queued")).await.expect("queue");
        }

        let mut rx = client.take_receiver().expect("receiver");
        let (server_res, client_res) = tokio::join!(server.close(), async {
            // The peer drains everything queued before the stream ends,
            // then answers with its own close record.
            let mut delivered = 0;
            while let Some(msg) = rx.recv().await {
                assert_eq!(msg.data.as_ref(), b"queued");
                delivered += 1;
            }
            assert_eq!(delivered, 8);
            client.close().await
        });
        server_res.expect("server close");
        client_res.expect("client close");
    }

    #[tokio::test]
    async fn close_without_start() {
        let (a, _b) = pipe();
        let mut link = Link::new(a, &mut kdf(), true).expect("link");
        link.close().await.expect("close");
    }

    #[tokio::test]
    async fn unsecured_message_does_not_kill_the_session() {
        let (mut server, mut client) = linked_pair();
        server.start(8);
        client.start(8);

        let tx = server.sender().expect("sender");
        tx.send(Message::new(Header::default(), &b"xx"[..])).await.expect("queue");
        tx.send(secure(b"still alive")).await.expect("queue");

        let mut rx = client.take_receiver().expect("receiver");
        let got = rx.recv().await.expect("deliver");
        assert_eq!(got.data.as_ref(), b"still alive");

        let (server_res, client_res) = tokio::join!(server.close(), client.close());
        server_res.expect("server close");
        client_res.expect("client close");
    }
}
