//! Message status resolution.
//!
//! Status is derived on demand from the delivery and read markers held by the
//! message's recipients. Nothing here touches storage: callers fetch the
//! marker counts fresh and hand them in.

use crate::models::MessageStatus;

/// Marker counts for a single message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiptCounts {
    /// Participants other than the sender who were members when the message
    /// was created.
    pub recipients: usize,
    /// How many of those recipients hold a read marker.
    pub read: usize,
    /// Users other than the sender holding a delivery or read marker.
    pub seen: usize,
}

impl ReceiptCounts {
    pub fn status(self) -> MessageStatus {
        resolve(self)
    }
}

/// Resolve the status of a message from its marker counts.
///
/// - no recipients (self-conversation): always `Sent`
/// - every recipient has read it: `Read`
/// - anyone has read or received it: `Received`
/// - otherwise: `Sent`
pub fn resolve(counts: ReceiptCounts) -> MessageStatus {
    if counts.recipients == 0 {
        return MessageStatus::Sent;
    }
    if counts.read >= counts.recipients {
        MessageStatus::Read
    } else if counts.read > 0 || counts.seen > 0 {
        MessageStatus::Received
    } else {
        MessageStatus::Sent
    }
}
