//! Control records carried in message headers.

use serde::{Deserialize, Serialize};

/// Tagged control record inside a [`Header`](crate::Header).
///
/// The link inspects exactly one thing in a header: whether its meta slot
/// is the [`Meta::Close`] sentinel. Everything else is opaque and belongs
/// to the layers above.
///
/// The variant set is fixed at compile time, so both endpoints agree on
/// the encoding without any runtime registration. Layers that need their
/// own control records multiplex inside [`Meta::Custom`] by tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Meta {
    /// Ordinary application message, no control record attached
    None,

    /// Session termination marker; the last message a peer sends
    Close,

    /// Extension slot for control records defined above the link
    Custom {
        /// Record type, assigned by the upper layer
        tag: u32,
        /// Record contents, encoded by the upper layer
        body: Vec<u8>,
    },
}

impl Meta {
    /// Whether this record marks the end of the session.
    #[must_use]
    pub fn is_close(&self) -> bool {
        matches!(self, Meta::Close)
    }
}
