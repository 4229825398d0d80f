//! The queue façade: admission, removal, enumeration, startup recovery.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use outbox_common::{Clock, DomainSet, SystemClock};
use outbox_metrics::QueueMetrics;
use serde::Deserialize;

use crate::aliases::{AliasKind, AliasResolver};
use crate::courier::Courier;
use crate::error::QueueError;
use crate::id::IdGenerator;
use crate::item::{ITEM_FILE_PREFIX, Item, ItemError, Recipient, RecipientKind};
use crate::retry;
use crate::worker;

const fn default_max_queue_size() -> usize {
    200
}

const fn default_give_up_after_secs() -> u64 {
    retry::GIVE_UP_AFTER.as_secs()
}

const fn default_pipe_timeout_secs() -> u64 {
    30
}

/// Queue configuration. An embedding daemon deserializes this as part of its
/// own configuration; every knob has a default except the directory and the
/// DSN domain.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Directory holding one `m:<id>` file per item. Created (mode 0700) if
    /// absent.
    pub path: PathBuf,

    /// Domains this host is authoritative for. Mailbox recipients in these
    /// domains go to the local courier, everyone else to the remote one.
    #[serde(default)]
    pub local_domains: Vec<String>,

    /// Domain used in delivery status notifications we generate.
    pub dsn_domain: String,

    /// Reject admissions once the queue holds this many items.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Stop retrying an item this long after its admission.
    #[serde(default = "default_give_up_after_secs")]
    pub give_up_after_secs: u64,

    /// Hard deadline for one pipe delivery.
    #[serde(default = "default_pipe_timeout_secs")]
    pub pipe_timeout_secs: u64,
}

impl QueueConfig {
    /// A configuration with every knob at its default.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, dsn_domain: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            local_domains: Vec::new(),
            dsn_domain: dsn_domain.into(),
            max_queue_size: default_max_queue_size(),
            give_up_after_secs: default_give_up_after_secs(),
            pipe_timeout_secs: default_pipe_timeout_secs(),
        }
    }

    pub(crate) const fn give_up(&self) -> Duration {
        Duration::from_secs(self.give_up_after_secs)
    }

    pub(crate) const fn pipe_timeout(&self) -> Duration {
        Duration::from_secs(self.pipe_timeout_secs)
    }
}

/// The outbound mail queue.
///
/// Cheap to clone by the `Arc` within; workers keep the shared state alive
/// until they finish even if the handle is dropped.
#[derive(Debug, Clone)]
pub struct Queue {
    inner: Arc<Inner>,
}

/// Shared queue state: the index, collaborators, and instruments. Workers
/// hold an `Arc` to this and never touch the index directly; items come and
/// go only through admission and removal.
#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) config: QueueConfig,
    pub(crate) local_domains: DomainSet,

    /// Items in the queue, id -> item. Guarded by a readers-writer lock;
    /// never held across an await point.
    index: RwLock<HashMap<String, Arc<Item>>>,

    pub(crate) local_courier: Arc<dyn Courier>,
    pub(crate) remote_courier: Arc<dyn Courier>,
    aliases: Arc<dyn AliasResolver>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: QueueMetrics,
    ids: IdGenerator,
}

impl Queue {
    /// Create a queue over `config.path`, creating the directory (mode 0700)
    /// when absent. Must be called within a Tokio runtime.
    ///
    /// # Errors
    /// Returns an I/O error when the queue directory cannot be created.
    pub fn new(
        config: QueueConfig,
        aliases: Arc<dyn AliasResolver>,
        local_courier: Arc<dyn Courier>,
        remote_courier: Arc<dyn Courier>,
    ) -> std::io::Result<Self> {
        Self::with_clock(
            config,
            aliases,
            local_courier,
            remote_courier,
            Arc::new(SystemClock),
        )
    }

    /// Like [`Queue::new`], with an explicit time source. This is how tests
    /// fast-forward the retry schedule and the give-up horizon.
    ///
    /// # Errors
    /// Returns an I/O error when the queue directory cannot be created.
    pub fn with_clock(
        config: QueueConfig,
        aliases: Arc<dyn AliasResolver>,
        local_courier: Arc<dyn Courier>,
        remote_courier: Arc<dyn Courier>,
        clock: Arc<dyn Clock>,
    ) -> std::io::Result<Self> {
        create_queue_dir(&config.path)?;

        let local_domains = DomainSet::new(&config.local_domains);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                local_domains,
                index: RwLock::new(HashMap::new()),
                local_courier,
                remote_courier,
                aliases,
                clock,
                metrics: QueueMetrics::new(),
                ids: IdGenerator::new(),
            }),
        })
    }

    /// Put an envelope in the queue. On success the item is durable and its
    /// worker is already running; the returned id names it.
    ///
    /// # Errors
    /// Admission errors only: queue full, alias resolution failure, empty
    /// expansion, or a failed initial persist. Nothing is left behind on
    /// error.
    pub async fn put(
        &self,
        from: &str,
        to: &[String],
        data: impl Into<Arc<[u8]>>,
    ) -> Result<String, QueueError> {
        Inner::put(&self.inner, from, to, data.into()).await
    }

    /// Remove an item from the queue. Unknown ids are a no-op; a failed
    /// unlink is logged, never surfaced.
    pub async fn remove(&self, id: &str) {
        self.inner.remove(id).await;
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recover queue state from disk at startup: every `m:*` file becomes an
    /// item with a running worker. Unparseable files are logged, skipped,
    /// and left in place for inspection. Returns how many items were loaded.
    ///
    /// # Errors
    /// Returns an error only when the queue directory itself cannot be read.
    pub async fn load(&self) -> Result<usize, QueueError> {
        Inner::load(&self.inner).await
    }

    /// A human-readable snapshot of the queue, for diagnostics only.
    pub async fn dump_string(&self) -> String {
        self.inner.dump_string().await
    }

    /// The queue's metrics instruments.
    pub fn metrics(&self) -> &QueueMetrics {
        &self.inner.metrics
    }
}

impl Inner {
    pub(crate) async fn put(
        inner: &Arc<Self>,
        from: &str,
        to: &[String],
        data: Arc<[u8]>,
    ) -> Result<String, QueueError> {
        // Advisory cap: checked without the write lock, so concurrent
        // admissions may briefly overshoot.
        if inner.len() >= inner.config.max_queue_size {
            return Err(QueueError::Full);
        }

        let id = inner.ids.next().await;
        let created_at = inner.clock.now();

        let mut rcpt = Vec::new();
        for t in to {
            let targets = inner
                .aliases
                .resolve(t)
                .await
                .map_err(|e| QueueError::Alias {
                    addr: t.clone(),
                    reason: e.to_string(),
                })?;
            for target in targets {
                let kind = match target.kind {
                    AliasKind::Mailbox => RecipientKind::Mailbox,
                    AliasKind::Pipe => RecipientKind::Pipe,
                };
                rcpt.push(Recipient::new(target.address, kind, t.clone()));
            }
        }
        if rcpt.is_empty() {
            return Err(QueueError::EmptyExpansion);
        }

        let item = Arc::new(Item::new(
            id.clone(),
            from.to_string(),
            to.to_vec(),
            data,
            created_at,
            rcpt,
        ));

        inner.persist(&item).await?;

        inner
            .index
            .write()
            .expect("queue index lock poisoned")
            .insert(id.clone(), Arc::clone(&item));

        inner.metrics.record_put();
        tracing::info!(item_id = %id, from = %from, "queued");

        // Begin to send it right away.
        worker::spawn(Arc::clone(inner), item);

        Ok(id)
    }

    pub(crate) async fn load(inner: &Arc<Self>) -> Result<usize, QueueError> {
        let mut entries = tokio::fs::read_dir(&inner.config.path)
            .await
            .map_err(ItemError::from)?;

        let mut loaded = 0;
        while let Some(entry) = entries.next_entry().await.map_err(ItemError::from)? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(ITEM_FILE_PREFIX) {
                continue;
            }

            let path = entry.path();
            match Item::read_from(&path).await {
                Ok(item) => {
                    let item = Arc::new(item);
                    inner
                        .index
                        .write()
                        .expect("queue index lock poisoned")
                        .insert(item.id().to_string(), Arc::clone(&item));
                    worker::spawn(Arc::clone(inner), item);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "error loading queue item, leaving file in place"
                    );
                }
            }
        }

        Ok(loaded)
    }

    pub(crate) async fn remove(&self, id: &str) {
        let path = Item::file_path(&self.config.path, id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::error!(path = %path.display(), error = %e, "failed to remove queue file");
        }

        self.index
            .write()
            .expect("queue index lock poisoned")
            .remove(id);
    }

    pub(crate) fn len(&self) -> usize {
        self.index.read().expect("queue index lock poisoned").len()
    }

    /// Write the item to the queue directory, counting the persist.
    pub(crate) async fn persist(&self, item: &Item) -> Result<(), ItemError> {
        self.metrics.record_item_written();
        item.write_to(&self.config.path).await
    }

    pub(crate) async fn dump_string(&self) -> String {
        let items: Vec<Arc<Item>> = {
            let index = self.index.read().expect("queue index lock poisoned");
            index.values().cloned().collect()
        };

        let mut s = String::from("# Queue status\n\n");
        let _ = writeln!(s, "date: {}", DateTime::<Utc>::from(self.clock.now()));
        let _ = writeln!(s, "length: {}\n", items.len());

        for item in items {
            let _ = writeln!(s, "## Item {}", item.id());
            let _ = writeln!(s, "created at: {}", DateTime::<Utc>::from(item.created_at()));
            let _ = writeln!(s, "from: {}", item.from());
            let _ = writeln!(s, "to: {:?}", item.to());
            for rcpt in item.recipients().await {
                let _ = writeln!(s, "{} {} ({})", rcpt.status, rcpt.address, rcpt.kind);
                let _ = writeln!(s, "  original address: {}", rcpt.original_address);
                let _ = writeln!(s, "  last failure: {:?}", rcpt.last_failure_message);
            }
            s.push('\n');
        }

        s
    }
}

fn create_queue_dir(path: &std::path::Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt as _;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(path)
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(path)
    }
}
