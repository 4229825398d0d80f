//! Injectable time source.
//!
//! Queue workers sleep for minutes between delivery rounds and give up after
//! twelve hours; routing `now` and `sleep` through a trait lets tests
//! fast-forward that schedule instead of waiting it out.

use std::{
    future::Future,
    pin::Pin,
    sync::Mutex,
    time::{Duration, SystemTime},
};

use tokio::sync::Notify;

/// A source of wall-clock time and timed sleeps.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current wall-clock time.
    fn now(&self) -> SystemTime;

    /// Completes once `duration` has elapsed on this clock.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// The real clock: `SystemTime::now` and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// A manually driven clock for tests.
///
/// `advance` moves time forward and wakes every pending sleeper whose
/// deadline has been reached. Sleepers re-check their deadline on every
/// wakeup, so a single large advance satisfies several queued sleeps.
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<SystemTime>,
    tick: Notify,
}

impl MockClock {
    #[must_use]
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
            tick: Notify::new(),
        }
    }

    /// Move the clock forward and wake all sleepers.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn advance(&self, duration: Duration) {
        {
            let mut now = self.now.lock().expect("MockClock mutex poisoned");
            *now += duration;
        }
        self.tick.notify_waiters();
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("MockClock mutex poisoned")
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let deadline = self.now() + duration;
        Box::pin(async move {
            loop {
                // Register for the next tick before checking the deadline so
                // an advance between the check and the await is not missed.
                let tick = self.tick.notified();
                tokio::pin!(tick);
                tick.as_mut().enable();
                if self.now() >= deadline {
                    return;
                }
                tick.await;
            }
        })
    }
}
