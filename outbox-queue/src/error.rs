//! Admission errors.
//!
//! These are the only errors callers of the queue ever see. Everything that
//! happens after an envelope is admitted (delivery failures, persistence
//! failures, DSN troubles) is internal: observable through disk state,
//! metrics, logs, and eventually a bounce, never through a return value.

use thiserror::Error;

use crate::item::ItemError;

/// Why an envelope was not admitted to the queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue is at capacity. The cap is a safety valve checked without
    /// the index write lock held, so brief overshoot under concurrent
    /// admissions is possible.
    #[error("queue size too big, try again later")]
    Full,

    /// The alias resolver failed for one of the envelope recipients.
    #[error("error resolving aliases for {addr}: {reason}")]
    Alias { addr: String, reason: String },

    /// Alias resolution succeeded but produced no delivery targets at all.
    #[error("alias expansion produced no recipients")]
    EmptyExpansion,

    /// The item could not be written to the queue directory.
    #[error("failed to write item: {0}")]
    Store(#[from] ItemError),
}
