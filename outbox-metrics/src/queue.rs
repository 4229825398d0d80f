//! Queue metrics collector.
//!
//! Counter names are part of the operational contract:
//! `queue/putCount`, `queue/itemsWritten`, `queue/dsnQueued`, and
//! `queue/deliverAttempts` with a `kind` attribute of `pipe`,
//! `email:local`, or `email:remote`.
//!
//! Each OpenTelemetry instrument is mirrored by a local atomic so current
//! values stay readable in-process (tests, debug dumps) without an exporter.

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};

/// The dispatch kind of a delivery attempt, as recorded on
/// `queue/deliverAttempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverKind {
    Pipe,
    EmailLocal,
    EmailRemote,
}

impl DeliverKind {
    /// The normative attribute value for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pipe => "pipe",
            Self::EmailLocal => "email:local",
            Self::EmailRemote => "email:remote",
        }
    }
}

impl std::fmt::Display for DeliverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue metrics collector.
#[derive(Debug)]
pub struct QueueMetrics {
    /// Successful admissions.
    put_count: Counter<u64>,

    /// Item persists (writes to the queue directory).
    items_written: Counter<u64>,

    /// Delivery status notifications enqueued.
    dsn_queued: Counter<u64>,

    /// Dispatch attempts, attributed by kind.
    deliver_attempts: Counter<u64>,

    // Local mirrors of the counters above.
    put_count_local: AtomicU64,
    items_written_local: AtomicU64,
    dsn_queued_local: AtomicU64,
    attempts_pipe: AtomicU64,
    attempts_email_local: AtomicU64,
    attempts_email_remote: AtomicU64,
}

impl QueueMetrics {
    /// Create the queue metrics instruments.
    #[must_use]
    pub fn new() -> Self {
        let meter = meter();

        let put_count = meter
            .u64_counter("queue/putCount")
            .with_description("Successful queue admissions")
            .build();

        let items_written = meter
            .u64_counter("queue/itemsWritten")
            .with_description("Queue item persists")
            .build();

        let dsn_queued = meter
            .u64_counter("queue/dsnQueued")
            .with_description("Delivery status notifications enqueued")
            .build();

        let deliver_attempts = meter
            .u64_counter("queue/deliverAttempts")
            .with_description("Delivery dispatch attempts by kind")
            .build();

        Self {
            put_count,
            items_written,
            dsn_queued,
            deliver_attempts,
            put_count_local: AtomicU64::new(0),
            items_written_local: AtomicU64::new(0),
            dsn_queued_local: AtomicU64::new(0),
            attempts_pipe: AtomicU64::new(0),
            attempts_email_local: AtomicU64::new(0),
            attempts_email_remote: AtomicU64::new(0),
        }
    }

    /// Record a successful admission.
    pub fn record_put(&self) {
        self.put_count.add(1, &[]);
        self.put_count_local.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item persist.
    pub fn record_item_written(&self) {
        self.items_written.add(1, &[]);
        self.items_written_local.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a DSN admission.
    pub fn record_dsn_queued(&self) {
        self.dsn_queued.add(1, &[]);
        self.dsn_queued_local.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dispatch attempt of the given kind.
    pub fn record_deliver_attempt(&self, kind: DeliverKind) {
        self.deliver_attempts
            .add(1, &[KeyValue::new("kind", kind.as_str())]);
        self.attempt_mirror(kind).fetch_add(1, Ordering::Relaxed);
    }

    /// Current `queue/putCount` value.
    pub fn put_count(&self) -> u64 {
        self.put_count_local.load(Ordering::Relaxed)
    }

    /// Current `queue/itemsWritten` value.
    pub fn items_written(&self) -> u64 {
        self.items_written_local.load(Ordering::Relaxed)
    }

    /// Current `queue/dsnQueued` value.
    pub fn dsn_queued(&self) -> u64 {
        self.dsn_queued_local.load(Ordering::Relaxed)
    }

    /// Current `queue/deliverAttempts` value for one kind.
    pub fn deliver_attempts(&self, kind: DeliverKind) -> u64 {
        self.attempt_mirror(kind).load(Ordering::Relaxed)
    }

    const fn attempt_mirror(&self, kind: DeliverKind) -> &AtomicU64 {
        match kind {
            DeliverKind::Pipe => &self.attempts_pipe,
            DeliverKind::EmailLocal => &self.attempts_email_local,
            DeliverKind::EmailRemote => &self.attempts_email_remote,
        }
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the OpenTelemetry meter for queue metrics.
fn meter() -> Meter {
    opentelemetry::global::meter("outbox.queue")
}
