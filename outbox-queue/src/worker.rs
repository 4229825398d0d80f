//! The per-item send loop.
//!
//! Exactly one worker task runs per queued item. Each round it fans out a
//! task per still-pending recipient, joins them all, and either finishes
//! (everything terminal) or sleeps until the next round. The loop also ends
//! when the give-up horizon passes, at which point still-pending recipients
//! count as failed for bounce purposes.

use std::sync::Arc;

use outbox_common::address;
use tokio::task::JoinSet;

use crate::dispatch;
use crate::dsn;
use crate::item::{Item, Recipient, RecipientStatus};
use crate::queue::Inner;
use crate::retry;

/// Start the item's worker task.
pub(crate) fn spawn(queue: Arc<Inner>, item: Arc<Item>) {
    tokio::spawn(send_loop(queue, item));
}

async fn send_loop(queue: Arc<Inner>, item: Arc<Item>) {
    tracing::debug!(item_id = %item.id(), from = %item.from(), "send loop starting");

    let deadline = item.created_at() + queue.config.give_up();
    while queue.clock.now() < deadline {
        let mut attempts: JoinSet<()> = JoinSet::new();
        for (idx, rcpt) in item.pending().await {
            let queue = Arc::clone(&queue);
            let item = Arc::clone(&item);
            attempts.spawn(async move {
                attempt_one(&queue, &item, idx, &rcpt).await;
            });
        }
        // Every attempt of this round must land before deciding what's next.
        while attempts.join_next().await.is_some() {}

        if item.count_status(&[RecipientStatus::Pending]).await == 0 {
            break;
        }

        let delay = retry::next_delay(queue.clock.now(), item.created_at());
        tracing::info!(
            target: "maillog",
            item_id = %item.id(),
            from = %item.from(),
            delay_secs = delay.as_secs(),
            "queue loop waiting"
        );
        queue.clock.sleep(delay).await;
    }

    // Completed to all recipients, though some may not have succeeded.
    let unsent = item
        .count_status(&[RecipientStatus::Failed, RecipientStatus::Pending])
        .await;
    if unsent > 0 && !address::is_null_sender(item.from()) {
        dsn::send(&queue, &item).await;
    }

    tracing::info!(
        target: "maillog",
        item_id = %item.id(),
        from = %item.from(),
        delay_secs = 0_u64,
        "queue loop done"
    );
    queue.remove(item.id()).await;
}

/// One delivery attempt for one recipient: dispatch, fold the outcome into
/// the item, persist. A persist failure is logged and left for the next
/// round's write to supersede.
async fn attempt_one(queue: &Inner, item: &Item, idx: usize, rcpt: &Recipient) {
    tracing::debug!(item_id = %item.id(), to = %rcpt.address, "attempting delivery");

    let result = dispatch::deliver_recipient(queue, item, rcpt).await;
    match &result {
        Ok(()) => {
            tracing::info!(
                target: "maillog",
                item_id = %item.id(),
                from = %item.from(),
                to = %rcpt.address,
                "sent"
            );
        }
        Err(e) if e.is_permanent() => {
            tracing::warn!(
                target: "maillog",
                item_id = %item.id(),
                from = %item.from(),
                to = %rcpt.address,
                error = %e,
                "permanent failure"
            );
        }
        Err(e) => {
            tracing::info!(
                target: "maillog",
                item_id = %item.id(),
                from = %item.from(),
                to = %rcpt.address,
                error = %e,
                "temporary failure"
            );
        }
    }

    item.record_attempt(idx, &result).await;

    if let Err(e) = queue.persist(item).await {
        tracing::error!(item_id = %item.id(), error = %e, "failed to write item");
    }
}
