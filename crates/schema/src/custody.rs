//! Per-item custody history.

use custodian_common::{HashAlgorithm, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What happened to an evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CustodyAction {
    Collected,
    Verified,
    VerificationFailed,
    Accessed,
    Exported,
    Sealed,
}

impl CustodyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustodyAction::Collected => "collected",
            CustodyAction::Verified => "verified",
            CustodyAction::VerificationFailed => "verification-failed",
            CustodyAction::Accessed => "accessed",
            CustodyAction::Exported => "exported",
            CustodyAction::Sealed => "sealed",
        }
    }
}

impl fmt::Display for CustodyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single custody event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyEvent {
    pub action: CustodyAction,
    /// Principal that performed the action.
    pub actor: String,
    pub timestamp: Timestamp,
    /// Action-specific detail (verification result, export format, ...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

/// Ordered, append-only custody history of one evidence item.
///
/// The chain can only grow through [`CustodyChain::append`], which keeps
/// timestamps non-decreasing. The first event is always `collected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustodyChain(Vec<CustodyEvent>);

impl CustodyChain {
    /// Start a chain with its `collected` event.
    pub fn start(actor: impl Into<String>, detail: Value) -> Self {
        Self(vec![CustodyEvent {
            action: CustodyAction::Collected,
            actor: actor.into(),
            timestamp: Timestamp::now(),
            detail,
        }])
    }

    /// Rebuild a chain read back from an export, for checking only.
    pub fn from_events(events: Vec<CustodyEvent>) -> Self {
        Self(events)
    }

    /// Append an event; returns the stored copy.
    pub fn append(
        &mut self,
        action: CustodyAction,
        actor: impl Into<String>,
        detail: Value,
    ) -> &CustodyEvent {
        let timestamp = Timestamp::now_after(self.0.last().map(|e| e.timestamp));
        self.0.push(CustodyEvent {
            action,
            actor: actor.into(),
            timestamp,
            detail,
        });
        // The vector was just pushed to, so it cannot be empty.
        &self.0[self.0.len() - 1]
    }

    pub fn events(&self) -> &[CustodyEvent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&CustodyEvent> {
        self.0.last()
    }

    pub fn count(&self, action: CustodyAction) -> usize {
        self.0.iter().filter(|e| e.action == action).count()
    }

    /// Digest over the canonical JSON of every event, in order.
    pub fn digest(&self, algorithm: HashAlgorithm) -> String {
        let value = serde_json::to_value(&self.0).unwrap_or(Value::Null);
        algorithm.digest(&custodian_common::hash::canonical_json(&value))
    }

    /// Check the structural invariants of a chain read from outside the
    /// ledger: non-empty, starts with `collected`, timestamps non-decreasing.
    pub fn is_well_formed(&self) -> bool {
        match self.0.first() {
            Some(first) if first.action == CustodyAction::Collected => self
                .0
                .windows(2)
                .all(|pair| pair[0].timestamp <= pair[1].timestamp),
            _ => false,
        }
    }
}
