//! Test doubles for queue scenarios: a scriptable courier and a table-driven
//! alias resolver.
#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use outbox_queue::{
    AliasError, AliasKind, AliasResolver, AliasTarget, Courier, DeliveryError,
};
use tokio::sync::Notify;

type DeliveryResult = Result<(), DeliveryError>;

/// One recorded courier handoff.
#[derive(Debug, Clone)]
pub struct RecordedDelivery {
    pub from: String,
    pub to: String,
    pub data: Vec<u8>,
}

/// A courier that records every call and replays scripted outcomes.
///
/// Outcomes are scripted per recipient address and consumed in order; once a
/// recipient's script is exhausted (or was never set), the default outcome
/// applies.
#[derive(Debug)]
pub struct ScriptedCourier {
    default: DeliveryResult,
    scripts: Mutex<HashMap<String, VecDeque<DeliveryResult>>>,
    calls: Mutex<Vec<RecordedDelivery>>,
    notify: Notify,
}

impl ScriptedCourier {
    pub fn new(default: DeliveryResult) -> Arc<Self> {
        Arc::new(Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(Ok(()))
    }

    pub fn failing_permanently(diagnostic: &str) -> Arc<Self> {
        Self::new(Err(DeliveryError::Permanent(diagnostic.to_string())))
    }

    pub fn failing_temporarily(diagnostic: &str) -> Arc<Self> {
        Self::new(Err(DeliveryError::Temporary(diagnostic.to_string())))
    }

    /// Script the next outcomes for deliveries to `to`.
    pub fn script(&self, to: &str, outcomes: Vec<DeliveryResult>) {
        self.scripts
            .lock()
            .expect("ScriptedCourier scripts mutex poisoned")
            .entry(to.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn calls(&self) -> Vec<RecordedDelivery> {
        self.calls
            .lock()
            .expect("ScriptedCourier calls mutex poisoned")
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .expect("ScriptedCourier calls mutex poisoned")
            .len()
    }

    /// Wait until at least `expected` deliveries were attempted.
    pub async fn wait_for_calls(&self, expected: usize, timeout: Duration) -> anyhow::Result<()> {
        tokio::time::timeout(timeout, async {
            loop {
                // Register before checking, so a delivery landing in between
                // still wakes us.
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.call_count() >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for {expected} deliveries"))
    }
}

impl Courier for ScriptedCourier {
    fn deliver<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = DeliveryResult> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .expect("ScriptedCourier calls mutex poisoned")
                .push(RecordedDelivery {
                    from: from.to_string(),
                    to: to.to_string(),
                    data: data.to_vec(),
                });
            self.notify.notify_waiters();

            let scripted = self
                .scripts
                .lock()
                .expect("ScriptedCourier scripts mutex poisoned")
                .get_mut(to)
                .and_then(VecDeque::pop_front);
            scripted.unwrap_or_else(|| self.default.clone())
        })
    }
}

/// A resolver backed by a fixed table; unlisted addresses resolve to
/// themselves as mailboxes.
#[derive(Debug, Default)]
pub struct TableResolver {
    table: HashMap<String, Vec<AliasTarget>>,
}

impl TableResolver {
    pub fn identity() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn with_mailbox(mut self, addr: &str, target: &str) -> Self {
        self.table.entry(addr.to_string()).or_default().push(AliasTarget {
            address: target.to_string(),
            kind: AliasKind::Mailbox,
        });
        self
    }

    #[must_use]
    pub fn with_pipe(mut self, addr: &str, command: &str) -> Self {
        self.table.entry(addr.to_string()).or_default().push(AliasTarget {
            address: command.to_string(),
            kind: AliasKind::Pipe,
        });
        self
    }
}

impl AliasResolver for TableResolver {
    fn resolve<'a>(
        &'a self,
        addr: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AliasTarget>, AliasError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self.table.get(addr).cloned().unwrap_or_else(|| {
                vec![AliasTarget {
                    address: addr.to_string(),
                    kind: AliasKind::Mailbox,
                }]
            }))
        })
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until(condition: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
