//! Weft link core: the encrypted full-duplex message channel that sits
//! between a framed byte-stream transport and a message-oriented
//! application layer.
//!
//! # Architecture
//!
//! ```text
//!            application
//!        send ↓        ↑ recv          (bounded channels)
//!   ┌─────────────────────────────┐
//!   │ Link                        │
//!   │  sender task   receiver task│   one per direction, each owning
//!   │  [CTR + HMAC]  [CTR + HMAC] │   its half-duplex crypto state
//!   └─────────────────────────────┘
//!          ↓ frames        ↑ frames
//!            Transport (framed, reliable, full duplex)
//! ```
//!
//! Peers authenticate and derive a shared key stream elsewhere; the link
//! consumes that stream to set up two one-directional channels (server's
//! triple first), then moves whole messages with encrypted headers and a
//! chained MAC over everything. Graceful shutdown drains pending sends,
//! marks the stream end with a close record, and keeps delivering inbound
//! messages until the peer's close record arrives.
//!
//! # Modules
//!
//! - [`link`]: the `Link` state machine, worker loops and graceful close
//! - [`suite`]: session cipher/hash selection
//! - [`transport`]: the framed transport contract the link consumes
//! - [`queue`]: block-circular FIFO used for in-memory buffering
//! - [`config`], [`error`]: runtime knobs and failure taxonomy

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
mod halfduplex;
pub mod link;
pub mod queue;
pub mod suite;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use config::LinkConfig;
pub use error::LinkError;
pub use link::Link;
pub use queue::Queue;
pub use suite::{Aes128Sha256, Aes256Sha256, Suite};
pub use transport::Transport;
