//! Change notifications published after each committed state change.

use custodian_common::Timestamp;
use custodian_schema::{AuditAction, AuditEntry};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// A committed ledger change, mirrored from its audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub action: AuditAction,
    pub actor: String,
    pub investigation_id: Option<String>,
    pub evidence_id: Option<String>,
    pub package_id: Option<String>,
}

impl From<&AuditEntry> for LedgerEvent {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            seq: entry.seq,
            timestamp: entry.timestamp,
            action: entry.action,
            actor: entry.actor.clone(),
            investigation_id: entry.investigation_id.clone(),
            evidence_id: entry.evidence_id.clone(),
            package_id: entry.package_id.clone(),
        }
    }
}

/// Fan-out of ledger events to any number of subscribers.
///
/// Publishing never blocks and never fails: with no subscribers the event
/// is dropped, and slow subscribers observe `RecvError::Lagged`.
#[derive(Debug)]
pub struct Notifier {
    sender: broadcast::Sender<LedgerEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, entries: &[AuditEntry]) {
        for entry in entries {
            if self.sender.send(LedgerEvent::from(entry)).is_err() {
                debug!(seq = entry.seq, "no subscribers for ledger event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_schema::{AuditLog, AuditRecord};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();

        let mut log = AuditLog::new();
        let entry = log
            .record(AuditRecord::new(AuditAction::PackageCreated, "alice").package("pkg-1"))
            .clone();
        notifier.publish(&[entry]);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.action, AuditAction::PackageCreated);
        assert_eq!(event.package_id.as_deref(), Some("pkg-1"));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = Notifier::new(1);
        let mut log = AuditLog::new();
        let entry = log
            .record(AuditRecord::new(AuditAction::AuditExported, "alice"))
            .clone();
        notifier.publish(&[entry]);
    }
}
