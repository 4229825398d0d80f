//! Envelope address helpers.
//!
//! These operate on already-validated envelope addresses; full RFC 5322
//! parsing belongs to the admission path, not the queue.

use std::collections::HashSet;

/// The null envelope sender, used for delivery status notifications.
pub const NULL_SENDER: &str = "<>";

/// Returns the user part of an address (everything before the final `@`),
/// or the whole string when there is no domain part.
pub fn user_of(addr: &str) -> &str {
    addr.rsplit_once('@').map_or(addr, |(user, _)| user)
}

/// Returns the domain part of an address (everything after the final `@`),
/// or the empty string when there is none.
pub fn domain_of(addr: &str) -> &str {
    addr.rsplit_once('@').map_or("", |(_, domain)| domain)
}

/// Whether the address is the null sender.
pub fn is_null_sender(addr: &str) -> bool {
    addr == NULL_SENDER
}

/// The set of domains this host is authoritative for.
///
/// Domains are matched case-insensitively. Addresses without a domain part
/// (including the null sender) are considered local, so they are never put
/// through the forwarding sender rewrite.
#[derive(Debug, Clone, Default)]
pub struct DomainSet(HashSet<String>);

impl DomainSet {
    #[must_use]
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            domains
                .into_iter()
                .map(|d| d.as_ref().to_ascii_lowercase())
                .collect(),
        )
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.0.contains(&domain.to_ascii_lowercase())
    }

    /// Whether the domain of `addr` is local. Domainless addresses are local.
    pub fn contains_addr(&self, addr: &str) -> bool {
        let domain = domain_of(addr);
        domain.is_empty() || self.contains(domain)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for DomainSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
