//! The alias resolver contract.
//!
//! Resolution happens once, at admission: each envelope recipient is expanded
//! into its delivery targets, and the expansion is what gets persisted.

use std::{future::Future, pin::Pin};

use thiserror::Error;

/// What sort of delivery target an alias expands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    /// A mailbox address, delivered through a courier.
    Mailbox,
    /// A command line; the message is piped to the process on stdin.
    Pipe,
}

/// One expansion of an envelope recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTarget {
    /// The resolved destination: a mailbox address, or a command line for
    /// the pipe kind.
    pub address: String,
    pub kind: AliasKind,
}

/// Alias resolution failure. Surfaces from admission as
/// [`QueueError::Alias`](crate::QueueError::Alias).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct AliasError(pub String);

/// Expands envelope recipients into delivery targets.
///
/// Must be safe to call from many tasks concurrently.
pub trait AliasResolver: Send + Sync + std::fmt::Debug {
    /// Resolve `addr` into zero or more delivery targets.
    fn resolve<'a>(
        &'a self,
        addr: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AliasTarget>, AliasError>> + Send + 'a>>;
}
