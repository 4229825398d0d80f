//! Metrics instruments for the outbox mail queue.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod queue;

pub use queue::{DeliverKind, QueueMetrics};
