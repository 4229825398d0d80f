//! Durable outbound mail queue.
//!
//! Accepted envelopes are expanded through the alias resolver, persisted one
//! file per item, and delivered asynchronously: a worker task per item drives
//! concurrent attempts for every still-pending recipient, retries transient
//! failures on a stepped schedule, gives up after twelve hours, and bounces a
//! delivery status notification back to the sender for recipients that never
//! succeeded.
//!
//! Couriers (local mailbox delivery and remote relay) and the alias resolver
//! are consumed contracts; see [`courier::Courier`] and
//! [`aliases::AliasResolver`].

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod aliases;
pub mod courier;
mod dispatch;
mod dsn;
pub mod error;
mod id;
pub mod item;
pub mod retry;
mod worker;

mod queue;

pub use aliases::{AliasError, AliasKind, AliasResolver, AliasTarget};
pub use courier::{Courier, DeliveryError};
pub use error::QueueError;
pub use item::{Item, ItemError, Message, Recipient, RecipientKind, RecipientStatus};
pub use queue::{Queue, QueueConfig};

// Collaborator types that appear in this crate's public API.
pub use outbox_common::{Clock, MockClock, NULL_SENDER, SystemClock};
pub use outbox_metrics::{DeliverKind, QueueMetrics};
