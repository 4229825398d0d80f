//! Item identifier generation.
//!
//! Ids are base64url (unpadded) encodings of 8 random bytes: short, opaque,
//! and collision-resistant over a queue lifetime of weeks. They are internal
//! names, not security tokens, so a PRNG seeded from the wall clock is
//! enough. A background producer keeps a small channel topped up; consumers
//! drain it on demand.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{RngCore as _, SeedableRng as _, rngs::SmallRng};
use tokio::sync::{Mutex, mpsc};

const ID_BYTES: usize = 8;
const CHANNEL_CAPACITY: usize = 4;

/// A stream of fresh item ids.
///
/// Must be created inside a Tokio runtime; construction spawns the producer.
#[derive(Debug)]
pub(crate) struct IdGenerator {
    rx: Mutex<mpsc::Receiver<String>>,
}

impl IdGenerator {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut rng = SmallRng::seed_from_u64(clock_seed());
            let mut buf = [0u8; ID_BYTES];
            loop {
                rng.fill_bytes(&mut buf);
                if tx.send(URL_SAFE_NO_PAD.encode(buf)).await.is_err() {
                    // Generator dropped; nothing left to feed.
                    return;
                }
            }
        });

        Self { rx: Mutex::new(rx) }
    }

    /// The next fresh id.
    pub(crate) async fn next(&self) -> String {
        match self.rx.lock().await.recv().await {
            Some(id) => id,
            // The producer only stops when the receiver is gone, but fall
            // back to an inline draw rather than wedge admission.
            None => {
                let mut buf = [0u8; ID_BYTES];
                rand::rng().fill_bytes(&mut buf);
                URL_SAFE_NO_PAD.encode(buf)
            }
        }
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos() & u128::from(u64::MAX)).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_short_and_urlsafe() {
        let ids = IdGenerator::new();
        for _ in 0..16 {
            let id = ids.next().await;
            // 8 bytes -> 11 base64 characters, no padding.
            assert_eq!(id.len(), 11);
            assert!(
                id.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                "unexpected character in id {id:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_ids_do_not_repeat() {
        let ids = IdGenerator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..256 {
            assert!(seen.insert(ids.next().await));
        }
    }
}
