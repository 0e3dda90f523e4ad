// src/error.rs

use thiserror::Error;

/// Errors for programmer-misuse paths.
///
/// Transport-level failures never surface here; they are captured into the
/// owning operation's state and observed by polling, matching the
/// non-blocking design. These errors exist so a caller can notice that a
/// call was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OpError {
    /// `reply()` or `delegate()` was called on an empty operation. Nothing
    /// was sent.
    #[error("operation is empty; nothing will be sent")]
    EmptyOp,

    /// `send()` was called more than once on the same operation.
    #[error("operation was already sent")]
    AlreadySent,
}
