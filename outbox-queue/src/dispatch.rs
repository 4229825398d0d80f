//! Per-recipient dispatch: pipe to a process, local mailbox, or remote relay.

use std::process::Stdio;
use std::time::Duration;

use outbox_common::address;
use outbox_metrics::DeliverKind;
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;

use crate::courier::{DeliveryError, DeliveryResult};
use crate::item::{Item, Recipient, RecipientKind};
use crate::queue::Inner;

/// Deliver the item to one recipient, routed by kind and domain.
pub(crate) async fn deliver_recipient(
    queue: &Inner,
    item: &Item,
    rcpt: &Recipient,
) -> DeliveryResult {
    match rcpt.kind {
        RecipientKind::Pipe => {
            queue.metrics.record_deliver_attempt(DeliverKind::Pipe);
            run_pipe(queue.config.pipe_timeout(), &rcpt.address, item.data()).await
        }
        RecipientKind::Mailbox => {
            if queue.local_domains.contains_addr(&rcpt.address) {
                queue.metrics.record_deliver_attempt(DeliverKind::EmailLocal);
                queue
                    .local_courier
                    .deliver(item.from(), &rcpt.address, item.data())
                    .await
            } else {
                queue
                    .metrics
                    .record_deliver_attempt(DeliverKind::EmailRemote);
                // Forwarding a non-local sender to a non-local recipient
                // (an alias pointing off-host) with the original sender
                // intact risks SPF rejection: we are not an authorized
                // sender for that domain. Relay under a local return path
                // that embeds the original sender, so bounces still route.
                let from = if queue.local_domains.contains_addr(item.from()) {
                    item.from().to_string()
                } else {
                    forward_from(item.from(), rcpt)
                };
                queue
                    .remote_courier
                    .deliver(&from, &rcpt.address, item.data())
                    .await
            }
        }
    }
}

/// The rewritten envelope sender for cross-domain forwarding:
/// `<local_user>+fwd_from=<from, @ replaced by =>@<idna(original domain)>`.
///
/// The format is normative; other systems parse it. It assumes `+` is an
/// alias suffix separator. The domain goes out in IDNA ASCII form because
/// the next hop may not support SMTPUTF8.
fn forward_from(from: &str, rcpt: &Recipient) -> String {
    format!(
        "{}+fwd_from={}@{}",
        address::user_of(&rcpt.original_address),
        from.replace('@', "="),
        idna_to_ascii(address::domain_of(&rcpt.original_address)),
    )
}

/// IDNA ASCII form of `domain`, or `domain` itself when conversion fails.
fn idna_to_ascii(domain: &str) -> String {
    idna::domain_to_ascii(domain).unwrap_or_else(|_| domain.to_string())
}

/// Execute a pipe delivery: split the command line on whitespace, feed the
/// message on stdin, and require exit status 0 within the deadline. Every
/// pipe failure is permanent; pipes do not retry.
async fn run_pipe(deadline: Duration, command: &str, data: &[u8]) -> DeliveryResult {
    let argv: Vec<&str> = command.split_whitespace().collect();
    let Some((program, args)) = argv.split_first() else {
        return Err(DeliveryError::Permanent("empty pipe".to_string()));
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DeliveryError::Permanent(format!("failed to run pipe: {e}")))?;

    let fed_and_reaped = async {
        if let Some(mut stdin) = child.stdin.take() {
            // The child may legitimately exit without draining its stdin;
            // its exit status is what decides the outcome.
            let _ = stdin.write_all(data).await;
            let _ = stdin.shutdown().await;
        }
        child.wait_with_output().await
    };

    let output = match tokio::time::timeout(deadline, fed_and_reaped).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(DeliveryError::Permanent(format!("pipe failed: {e}")));
        }
        // Dropping the timed-out future kills the child.
        Err(_) => {
            return Err(DeliveryError::Permanent(format!(
                "pipe timed out after {}s",
                deadline.as_secs()
            )));
        }
    };

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    Err(DeliveryError::Permanent(if stderr.is_empty() {
        format!("pipe {}", output.status)
    } else {
        format!("pipe {}: {stderr}", output.status)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::RecipientKind;

    fn rcpt(original: &str) -> Recipient {
        Recipient::new(
            "berta@elsewhere.net".to_string(),
            RecipientKind::Mailbox,
            original.to_string(),
        )
    }

    #[test]
    fn test_forward_from_embeds_original_sender() {
        let from = forward_from("x@otherremote", &rcpt("fwd@local"));
        assert_eq!(from, "fwd+fwd_from=x=otherremote@local");
    }

    #[test]
    fn test_forward_from_applies_idna() {
        let from = forward_from("x@otherremote", &rcpt("fwd@münchen.example"));
        assert_eq!(from, "fwd+fwd_from=x=otherremote@xn--mnchen-3ya.example");
    }

    #[test]
    fn test_idna_falls_back_to_original_on_error() {
        // A disallowed character cannot be converted; the raw string is kept.
        assert_eq!(idna_to_ascii("exa mple.com"), "exa mple.com");
    }

    #[tokio::test]
    async fn test_empty_pipe_is_permanent() {
        let err = run_pipe(Duration::from_secs(30), "   ", b"data")
            .await
            .unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(err.to_string(), "empty pipe");
    }

    #[tokio::test]
    async fn test_pipe_success_and_failure() {
        assert!(
            run_pipe(Duration::from_secs(30), "/bin/cat", b"data")
                .await
                .is_ok()
        );

        let err = run_pipe(Duration::from_secs(30), "/bin/false", b"data")
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_pipe_deadline_kills_child() {
        let err = run_pipe(Duration::from_millis(100), "/bin/sleep 10", b"")
            .await
            .unwrap_err();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("timed out"));
    }
}
