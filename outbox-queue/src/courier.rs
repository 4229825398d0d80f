//! The courier contract.
//!
//! A courier is a pluggable delivery backend: one for local mailboxes, one
//! for remote SMTP relay. The queue treats both as opaque; their only job is
//! to move `(from, to, data)` and report whether a failure is worth retrying.

use std::{future::Future, pin::Pin};

use thiserror::Error;

/// A delivery failure, classified for retry purposes.
///
/// `Display` yields the bare diagnostic (no class prefix) so it can be stored
/// verbatim as a recipient's last failure message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Do not retry: the recipient is marked failed.
    #[error("{0}")]
    Permanent(String),

    /// Retry later: the recipient stays pending.
    #[error("{0}")]
    Temporary(String),
}

impl DeliveryError {
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

/// Outcome of a single courier handoff.
pub type DeliveryResult = Result<(), DeliveryError>;

/// A delivery backend.
///
/// Implementations must be safe to call from many tasks concurrently and own
/// their own timeouts; the queue imposes none.
pub trait Courier: Send + Sync + std::fmt::Debug {
    /// Attempt to hand `data` from `from` to `to`.
    fn deliver<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = DeliveryResult> + Send + 'a>>;
}
