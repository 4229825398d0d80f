//! Queued items and their durable representation.
//!
//! One item is one envelope plus per-recipient delivery state. Each item maps
//! 1:1 to a file named `m:<id>` in the queue directory, serialized as
//! pretty-printed JSON: human-inspectable, and tolerant of added fields on
//! read so older binaries can load files written by newer ones. The message
//! body travels base64-encoded inside the document.
//!
//! The `m:` prefix sits outside the base64url alphabet used for ids, so an
//! id can never be mistaken for the prefix namespace; in-progress writes use
//! a `tmp:` prefix and are renamed into place.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{io::AsyncWriteExt as _, sync::Mutex};

use crate::courier::DeliveryResult;

/// Prefix for item file names.
pub const ITEM_FILE_PREFIX: &str = "m:";

/// Prefix for in-progress writes, ignored on load.
const TMP_FILE_PREFIX: &str = "tmp:";

/// What sort of delivery target a recipient is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    Mailbox,
    Pipe,
}

impl std::fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Mailbox => "mailbox",
            Self::Pipe => "pipe",
        })
    }
}

/// Delivery state of one recipient.
///
/// Transitions are one-way: `pending -> sent` or `pending -> failed`.
/// A terminal status is never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
}

impl RecipientStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        })
    }
}

const fn default_status() -> RecipientStatus {
    RecipientStatus::Pending
}

/// One expanded delivery target of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Resolved destination: a mailbox address, or a command line for the
    /// pipe kind.
    pub address: String,

    pub kind: RecipientKind,

    #[serde(default = "default_status")]
    pub status: RecipientStatus,

    /// The pre-alias address this recipient was expanded from. The
    /// forwarding sender rewrite is built from it.
    pub original_address: String,

    /// Diagnostic from the most recent failed attempt, or empty.
    #[serde(default)]
    pub last_failure_message: String,
}

impl Recipient {
    #[must_use]
    pub fn new(address: String, kind: RecipientKind, original_address: String) -> Self {
        Self {
            address,
            kind,
            status: RecipientStatus::Pending,
            original_address,
            last_failure_message: String::new(),
        }
    }
}

/// The serialized form of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    /// Envelope sender; `"<>"` is the null sender.
    pub from: String,

    /// Original envelope recipients, as admitted (before alias expansion).
    #[serde(default)]
    pub to: Vec<String>,

    /// Message body, opaque bytes.
    #[serde(with = "body_encoding", default)]
    pub data: Arc<[u8]>,

    #[serde(default)]
    pub rcpt: Vec<Recipient>,

    /// Admission time, serialized as RFC 3339.
    pub created_at: DateTime<Utc>,
}

/// Base64 transport for the message body inside the JSON document.
mod body_encoding {
    use std::sync::Arc;

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize as _, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(data: &Arc<[u8]>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Arc<[u8]>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Arc::from)
            .map_err(de::Error::custom)
    }
}

/// Failure to read or write an item file.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("invalid item encoding: {0}")]
    Format(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One queued envelope and its per-recipient delivery state.
///
/// The envelope fields are immutable after admission; only recipient state
/// changes, and only under the item's own lock. The lock is also held across
/// the persist step, so every file on disk is a consistent snapshot.
#[derive(Debug)]
pub struct Item {
    id: String,
    from: String,
    to: Vec<String>,
    data: Arc<[u8]>,

    /// Serialized timestamp, kept verbatim for faithful rewrites.
    created_at_ts: DateTime<Utc>,

    /// Native form of `created_at_ts` for arithmetic.
    created_at: SystemTime,

    rcpt: Mutex<Vec<Recipient>>,
}

impl Item {
    #[must_use]
    pub fn new(
        id: String,
        from: String,
        to: Vec<String>,
        data: Arc<[u8]>,
        created_at: SystemTime,
        rcpt: Vec<Recipient>,
    ) -> Self {
        Self {
            id,
            from,
            to,
            data,
            created_at_ts: DateTime::<Utc>::from(created_at),
            created_at,
            rcpt: Mutex::new(rcpt),
        }
    }

    /// Parse an item from its queue file.
    ///
    /// # Errors
    /// Returns [`ItemError`] when the file cannot be read or decoded.
    pub async fn read_from(path: &Path) -> Result<Self, ItemError> {
        let raw = tokio::fs::read(path).await?;
        let msg: Message = serde_json::from_slice(&raw)?;
        Ok(Self {
            created_at: SystemTime::from(msg.created_at),
            created_at_ts: msg.created_at,
            id: msg.id,
            from: msg.from,
            to: msg.to,
            data: msg.data,
            rcpt: Mutex::new(msg.rcpt),
        })
    }

    /// Persist the item to `<dir>/m:<id>`, atomically with respect to
    /// readers: the serialized snapshot goes to a `tmp:` file (mode 0600)
    /// which is renamed into place. A failure mid-write leaves the previous
    /// file intact.
    ///
    /// # Errors
    /// Returns [`ItemError`] when serialization or any file operation fails.
    pub async fn write_to(&self, dir: &Path) -> Result<(), ItemError> {
        let rcpt = self.rcpt.lock().await;
        let encoded = serde_json::to_vec_pretty(&Message {
            id: self.id.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            data: self.data.clone(),
            rcpt: rcpt.clone(),
            created_at: self.created_at_ts,
        })?;

        let tmp = dir.join(format!("{TMP_FILE_PREFIX}{}", self.id));
        let mut file = open_create_0600(&tmp).await?;
        file.write_all(&encoded).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, Self::file_path(dir, &self.id)).await?;
        Ok(())
    }

    /// The queue file path for an item id.
    #[must_use]
    pub fn file_path(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{ITEM_FILE_PREFIX}{id}"))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &[String] {
        &self.to
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub const fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Indices and snapshots of every recipient still pending.
    pub async fn pending(&self) -> Vec<(usize, Recipient)> {
        self.rcpt
            .lock()
            .await
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == RecipientStatus::Pending)
            .map(|(i, r)| (i, r.clone()))
            .collect()
    }

    /// How many recipients are in any of the given statuses.
    pub async fn count_status(&self, statuses: &[RecipientStatus]) -> usize {
        self.rcpt
            .lock()
            .await
            .iter()
            .filter(|r| statuses.contains(&r.status))
            .count()
    }

    /// A snapshot of all recipients.
    pub async fn recipients(&self) -> Vec<Recipient> {
        self.rcpt.lock().await.clone()
    }

    /// The current serialized form of the item.
    pub async fn message(&self) -> Message {
        Message {
            id: self.id.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            data: self.data.clone(),
            rcpt: self.rcpt.lock().await.clone(),
            created_at: self.created_at_ts,
        }
    }

    /// Fold one attempt outcome into the recipient at `idx`.
    ///
    /// Success marks it sent (an earlier diagnostic is left as-is); a
    /// permanent error marks it failed; a temporary error leaves it pending.
    /// Only a pending recipient is ever updated; terminal statuses are
    /// never revisited.
    pub(crate) async fn record_attempt(&self, idx: usize, result: &DeliveryResult) {
        let mut rcpt = self.rcpt.lock().await;
        let Some(r) = rcpt.get_mut(idx) else {
            return;
        };
        if r.status != RecipientStatus::Pending {
            return;
        }
        match result {
            Ok(()) => r.status = RecipientStatus::Sent,
            Err(e) => {
                r.last_failure_message = e.to_string();
                if e.is_permanent() {
                    r.status = RecipientStatus::Failed;
                }
            }
        }
    }
}

async fn open_create_0600(path: &Path) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}
