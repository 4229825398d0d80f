//! Delivery status notification (bounce) generation.
//!
//! When a worker finishes with recipients that never reached `sent`, a
//! plain-text report goes back to the original sender as a fresh queue item
//! with the null envelope sender. Null-sender items never bounce again, which
//! is what keeps two misconfigured hosts from mailing each other forever.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use outbox_common::NULL_SENDER;

use crate::item::{Item, RecipientStatus};
use crate::queue::Inner;

/// Build the bounce for `item` and re-submit it through the queue.
/// Failures are logged and swallowed; a DSN is never worth wedging the
/// worker over.
pub(crate) async fn send(queue: &Arc<Inner>, item: &Item) {
    tracing::debug!(item_id = %item.id(), "sending DSN");

    let body = build(&queue.config.dsn_domain, queue.clock.now(), item).await;

    let body: Arc<[u8]> = body.into_bytes().into();
    match Inner::put(queue, NULL_SENDER, &[item.from().to_string()], body).await {
        Ok(dsn_id) => {
            queue.metrics.record_dsn_queued();
            tracing::info!(item_id = %item.id(), dsn_id = %dsn_id, "queued DSN");
        }
        Err(e) => {
            tracing::error!(item_id = %item.id(), error = %e, "failed to queue DSN");
        }
    }
}

/// The report body: original sender, item id, and each recipient that did
/// not reach `sent`, with its last recorded diagnostic.
async fn build(dsn_domain: &str, now: SystemTime, item: &Item) -> String {
    let date = DateTime::<Utc>::from(now).to_rfc2822();

    let mut failures = String::new();
    for r in item.recipients().await {
        if r.status == RecipientStatus::Sent {
            continue;
        }
        let diagnostic = if r.last_failure_message.is_empty() {
            "(no diagnostic recorded)"
        } else {
            r.last_failure_message.as_str()
        };
        let _ = write!(failures, "  - {}\n      {}\n", r.address, diagnostic);
    }

    format!(
        "From: Mail Delivery System <postmaster@{dsn_domain}>\r\n\
         To: <{from}>\r\n\
         Subject: Mail delivery failed: returning message to sender\r\n\
         Message-ID: <{id}@{dsn_domain}>\r\n\
         Date: {date}\r\n\
         Auto-Submitted: auto-replied\r\n\
         \r\n\
         Delivery of your message {id} failed for one or more recipients.\r\n\
         There will be no further attempts.\r\n\
         \r\n\
         Failed recipients:\r\n\
         \r\n\
         {failures}\r\n\
         -- \r\n\
         This notification was generated automatically, please do not reply.\r\n",
        from = item.from(),
        id = item.id(),
    )
}
