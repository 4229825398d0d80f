//! The give-up horizon: an item whose recipient keeps failing temporarily is
//! abandoned after twelve hours, bounced, and removed.
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use outbox_queue::{MockClock, Queue, QueueConfig};
use support::{ScriptedCourier, TableResolver, wait_until};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_give_up_after_twelve_hours() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(MockClock::new(SystemTime::now()));
    let local = ScriptedCourier::succeeding();
    let remote = ScriptedCourier::failing_temporarily("451 not today");

    let mut config = QueueConfig::new(dir.path(), "local");
    config.local_domains = vec!["local".to_string()];
    let queue = Queue::with_clock(
        config,
        TableResolver::identity(),
        local.clone(),
        remote.clone(),
        clock.clone(),
    )
    .unwrap();

    queue
        .put("a@local", &["b@remote".to_string()], &b"body"[..])
        .await
        .unwrap();

    remote.wait_for_calls(1, WAIT).await.unwrap();

    // Walk the clock past the horizon an hour at a time; each tick wakes the
    // worker for another failing round until it gives up.
    for _ in 0..40 {
        clock.advance(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(10)).await;
        if queue.is_empty() {
            break;
        }
    }
    assert!(wait_until(|| queue.is_empty(), WAIT).await);

    // The recipient was retried but never gave a permanent answer.
    assert!(remote.call_count() >= 2);

    // Give-up converts the still-pending recipient into a bounce.
    assert_eq!(queue.metrics().dsn_queued(), 1);
    let calls = local.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].from, "<>");
    assert_eq!(calls[0].to, "a@local");
    let bounce = String::from_utf8_lossy(&calls[0].data).into_owned();
    assert!(bounce.contains("b@remote"));
    assert!(bounce.contains("451 not today"));

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
