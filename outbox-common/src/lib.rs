//! Shared utilities for the outbox mail queue: envelope address helpers and
//! the injectable clock used to make retry timing testable.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod address;
pub mod clock;

pub use address::{DomainSet, NULL_SENDER};
pub use clock::{Clock, MockClock, SystemClock};
