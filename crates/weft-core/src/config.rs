//! Link configuration.

use std::time::Duration;

/// Tunables for a link.
///
/// The cipher and hash selection lives in the type system (see
/// [`Suite`](crate::Suite)); this struct carries the runtime knobs.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long `close` lets the workers drain before the transport
    /// deadline cuts blocked I/O loose.
    pub grace_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self { grace_timeout: Duration::from_secs(3) }
    }
}
