// src/driver.rs

use crate::types::{Address, RawAddress};

/// Transport-level status of an outbound message.
///
/// Reported by the driver; this layer never sets it, only reads it to
/// advance operation state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutStatus {
    /// The message has not been handed to the transport yet.
    NotStarted,
    /// Transmission is underway.
    InProgress,
    /// Every byte has been handed to the transport, but end-to-end
    /// completion has not been confirmed.
    Sent,
    /// The receiver has confirmed processing end to end.
    Completed,
    /// The transport gave up on delivering this message.
    Failed,
}

impl OutStatus {
    /// Get a human-readable description of this status.
    pub fn description(self) -> &'static str {
        match self {
            OutStatus::NotStarted => "not started",
            OutStatus::InProgress => "in progress",
            OutStatus::Sent => "sent",
            OutStatus::Completed => "completed",
            OutStatus::Failed => "failed",
        }
    }
}

/// An outbound message owned by an operation.
///
/// Implemented by the driver. There is no explicit release call; dropping
/// the box returns the message's resources to the driver.
pub trait OutMessage: Send {
    /// Reserve space at the front of the message for headers that will be
    /// prepended later.
    fn reserve(&mut self, bytes: usize);

    /// Append payload bytes to the message body.
    fn append(&mut self, data: &[u8]);

    /// Prepend header bytes into previously reserved space.
    fn prepend(&mut self, data: &[u8]);

    /// Hand the message to the transport for delivery to `destination`.
    fn send(&mut self, destination: Address);

    /// Deregister the message from the transport. A cancelled message may
    /// be sent again later.
    fn cancel(&mut self);

    /// Current transport-level status.
    fn status(&self) -> OutStatus;
}

/// An inbound message owned by an operation.
///
/// Implemented by the driver. Dropping the box releases the message's
/// resources back to the driver.
pub trait InMessage: Send {
    /// Number of readable bytes remaining after any `strip()` calls.
    fn len(&self) -> usize;

    /// True if no readable bytes remain.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy up to `buf.len()` bytes starting at `offset` into `buf`,
    /// returning the number of bytes copied.
    fn read(&self, offset: usize, buf: &mut [u8]) -> usize;

    /// Discard `len` bytes from the front of the message.
    fn strip(&mut self, len: usize);

    /// True if the transport has learned that the sender gave up on this
    /// message. No response is possible once this returns true.
    fn dropped(&self) -> bool;

    /// Tell the transport the message has been fully processed so upstream
    /// resources can be released.
    fn acknowledge(&mut self);

    /// Signal an unrecoverable processing failure back to the sender.
    fn fail(&mut self);
}

/// The underlying transport this layer sequences operations on top of.
///
/// The driver owns all real network I/O, retransmission, and address
/// resolution. This layer only allocates messages, polls for progress, and
/// drains received messages.
pub trait Driver: Send + Sync {
    /// Allocate an empty outbound message.
    fn alloc(&self) -> Box<dyn OutMessage>;

    /// Make transport-level progress. Must be cheap and non-blocking; it is
    /// called from every `OpManager::poll()`.
    fn poll(&self);

    /// Take the next fully received inbound message, if any.
    fn receive(&self) -> Option<Box<dyn InMessage>>;

    /// The address other transports should reply to.
    fn local_address(&self) -> Address;

    /// Decode a wire-format address blob into an address token.
    fn decode_address(&self, raw: &RawAddress) -> Address;

    /// Encode an address token into its wire-format blob.
    fn encode_address(&self, address: Address) -> RawAddress;
}
