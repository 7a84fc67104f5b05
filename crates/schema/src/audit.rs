//! System-wide audit log of every state-changing operation.
//!
//! Entries are hash-chained: each one stores the hash of its predecessor
//! and a hash over its own content, so any edit, removal or reordering of
//! a stored entry is detectable with [`AuditLog::verify_chain`].

use custodian_common::hash::{canonical_json, sha256_bytes};
use custodian_common::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// `prev_hash` of the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    InvestigationCreated,
    InvestigationCompleted,
    EvidenceCollected,
    EvidenceVerified,
    EvidenceVerificationFailed,
    EvidenceAccessed,
    EvidenceTagged,
    EvidenceMetadataUpdated,
    EvidenceSealed,
    EvidenceExported,
    PackageCreated,
    PackageActivated,
    EvidenceAddedToPackage,
    PackageAnnotated,
    PackageSealed,
    PackageVerified,
    PackageExported,
    AuditExported,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::InvestigationCreated => "investigation-created",
            AuditAction::InvestigationCompleted => "investigation-completed",
            AuditAction::EvidenceCollected => "evidence-collected",
            AuditAction::EvidenceVerified => "evidence-verified",
            AuditAction::EvidenceVerificationFailed => "evidence-verification-failed",
            AuditAction::EvidenceAccessed => "evidence-accessed",
            AuditAction::EvidenceTagged => "evidence-tagged",
            AuditAction::EvidenceMetadataUpdated => "evidence-metadata-updated",
            AuditAction::EvidenceSealed => "evidence-sealed",
            AuditAction::EvidenceExported => "evidence-exported",
            AuditAction::PackageCreated => "package-created",
            AuditAction::PackageActivated => "package-activated",
            AuditAction::EvidenceAddedToPackage => "evidence-added-to-package",
            AuditAction::PackageAnnotated => "package-annotated",
            AuditAction::PackageSealed => "package-sealed",
            AuditAction::PackageVerified => "package-verified",
            AuditAction::PackageExported => "package-exported",
            AuditAction::AuditExported => "audit-exported",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = custodian_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.trim().to_lowercase().replace('_', "-")))
            .map_err(|_| {
                custodian_common::Error::InvalidArgument(format!("unknown audit action: {}", s))
            })
    }
}

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the log, starting at 0.
    pub seq: u64,
    pub timestamp: Timestamp,
    pub action: AuditAction,
    pub actor: String,
    pub investigation_id: Option<String>,
    pub evidence_id: Option<String>,
    pub package_id: Option<String>,
    #[serde(default)]
    pub detail: Value,
    pub prev_hash: String,
    pub entry_hash: String,
}

impl AuditEntry {
    /// Hash over every field except `entry_hash` itself.
    pub fn compute_hash(&self) -> String {
        let content = json!({
            "seq": self.seq,
            "timestamp": self.timestamp,
            "action": self.action,
            "actor": self.actor,
            "investigation_id": self.investigation_id,
            "evidence_id": self.evidence_id,
            "package_id": self.package_id,
            "detail": self.detail,
            "prev_hash": self.prev_hash,
        });
        sha256_bytes(&canonical_json(&content))
    }
}

/// An entry about to be recorded; sequence, time and hashes are assigned by
/// the log.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub actor: String,
    pub investigation_id: Option<String>,
    pub evidence_id: Option<String>,
    pub package_id: Option<String>,
    pub detail: Value,
}

impl AuditRecord {
    pub fn new(action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            action,
            actor: actor.into(),
            investigation_id: None,
            evidence_id: None,
            package_id: None,
            detail: Value::Null,
        }
    }

    pub fn investigation(mut self, id: Option<&str>) -> Self {
        self.investigation_id = id.map(str::to_string);
        self
    }

    pub fn evidence(mut self, id: &str) -> Self {
        self.evidence_id = Some(id.to_string());
        self
    }

    pub fn package(mut self, id: &str) -> Self {
        self.package_id = Some(id.to_string());
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Read-only query over the audit log. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    #[serde(default)]
    pub investigation_id: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub action: Option<AuditAction>,
    #[serde(default)]
    pub evidence_id: Option<String>,
    #[serde(default)]
    pub package_id: Option<String>,
    /// Inclusive lower bound.
    #[serde(default)]
    pub since: Option<Timestamp>,
    /// Inclusive upper bound.
    #[serde(default)]
    pub until: Option<Timestamp>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        fn eq(filter: &Option<String>, value: &Option<String>) -> bool {
            filter.is_none() || filter.as_ref() == value.as_ref()
        }

        eq(&self.investigation_id, &entry.investigation_id)
            && self.actor.as_ref().map_or(true, |a| *a == entry.actor)
            && self.action.map_or(true, |a| a == entry.action)
            && eq(&self.evidence_id, &entry.evidence_id)
            && eq(&self.package_id, &entry.package_id)
            && self.since.map_or(true, |t| entry.timestamp >= t)
            && self.until.map_or(true, |t| entry.timestamp <= t)
    }
}

/// Result of walking the hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub entries: usize,
    /// Sequence number of the first entry that fails to link.
    pub broken_at: Option<u64>,
    /// `entry_hash` of the last entry; a compact commitment to the whole log.
    pub head_hash: String,
}

/// Append-only, hash-chained audit log (exported as JSONL).
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// Create a new empty audit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return the stored copy.
    pub fn record(&mut self, record: AuditRecord) -> &AuditEntry {
        let last = self.entries.last();
        let seq = last.map_or(0, |e| e.seq + 1);
        let prev_hash = last.map_or_else(|| GENESIS_HASH.to_string(), |e| e.entry_hash.clone());
        let timestamp = Timestamp::now_after(last.map(|e| e.timestamp));

        let mut entry = AuditEntry {
            seq,
            timestamp,
            action: record.action,
            actor: record.actor,
            investigation_id: record.investigation_id,
            evidence_id: record.evidence_id,
            package_id: record.package_id,
            detail: record.detail,
            prev_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash();
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Get all entries.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries matching `filter`, in chronological order.
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    pub fn head_hash(&self) -> &str {
        self.entries
            .last()
            .map_or(GENESIS_HASH, |e| e.entry_hash.as_str())
    }

    /// Walk the full chain: sequence numbers must be contiguous from 0.
    pub fn verify_chain(&self) -> ChainVerification {
        check_entries(&self.entries, true)
    }

    /// Convert entries to JSONL format.
    pub fn to_jsonl(entries: &[AuditEntry]) -> String {
        entries
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse a full log from JSONL format.
    pub fn from_jsonl(content: &str) -> Result<Self, serde_json::Error> {
        let mut log = Self::new();
        for line in content.lines() {
            if !line.trim().is_empty() {
                let entry: AuditEntry = serde_json::from_str(line)?;
                log.entries.push(entry);
            }
        }
        Ok(log)
    }
}

/// Check a possibly filtered run of entries.
///
/// A filtered export is not a contiguous chain; only per-entry hashes, the
/// links between consecutive sequence numbers and increasing order are
/// checked.
pub fn verify_entries(entries: &[AuditEntry]) -> ChainVerification {
    check_entries(entries, false)
}

fn check_entries(entries: &[AuditEntry], contiguous: bool) -> ChainVerification {
    let mut broken_at = None;
    for (i, entry) in entries.iter().enumerate() {
        let linked = match i.checked_sub(1).map(|p| &entries[p]) {
            None if entry.seq == 0 => entry.prev_hash == GENESIS_HASH,
            None => !contiguous,
            Some(prev) if prev.seq + 1 == entry.seq => entry.prev_hash == prev.entry_hash,
            Some(prev) => !contiguous && prev.seq < entry.seq,
        };
        if !linked || entry.compute_hash() != entry.entry_hash {
            broken_at = Some(entry.seq);
            break;
        }
    }

    ChainVerification {
        valid: broken_at.is_none(),
        entries: entries.len(),
        broken_at,
        head_hash: entries
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |e| e.entry_hash.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> AuditLog {
        let mut log = AuditLog::new();
        log.record(
            AuditRecord::new(AuditAction::InvestigationCreated, "alice").investigation(Some("inv-1")),
        );
        log.record(
            AuditRecord::new(AuditAction::EvidenceCollected, "alice")
                .investigation(Some("inv-1"))
                .evidence("ev-1"),
        );
        log.record(AuditRecord::new(AuditAction::PackageCreated, "bob").package("pkg-1"));
        log
    }

    #[test]
    fn test_entries_are_chained() {
        let log = sample_log();
        let entries = log.entries();
        assert_eq!(entries[0].prev_hash, GENESIS_HASH);
        assert_eq!(entries[1].prev_hash, entries[0].entry_hash);
        assert_eq!(entries[2].prev_hash, entries[1].entry_hash);
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let check = log.verify_chain();
        assert!(check.valid);
        assert_eq!(check.head_hash, log.head_hash());
    }

    #[test]
    fn test_tampered_entry_breaks_chain() {
        let mut log = sample_log();
        log.entries[1].actor = "mallory".to_string();
        let check = log.verify_chain();
        assert!(!check.valid);
        assert_eq!(check.broken_at, Some(1));
    }

    #[test]
    fn test_removed_entry_breaks_chain() {
        let mut log = sample_log();
        log.entries.remove(1);
        assert_eq!(log.verify_chain().broken_at, Some(2));
    }

    #[test]
    fn test_query_filters() {
        let log = sample_log();
        let by_inv = log.query(&AuditFilter {
            investigation_id: Some("inv-1".into()),
            ..Default::default()
        });
        assert_eq!(by_inv.len(), 2);

        let by_actor = log.query(&AuditFilter {
            actor: Some("bob".into()),
            ..Default::default()
        });
        assert_eq!(by_actor.len(), 1);
        assert_eq!(by_actor[0].action, AuditAction::PackageCreated);

        let by_action = log.query(&AuditFilter {
            action: Some(AuditAction::EvidenceCollected),
            ..Default::default()
        });
        assert_eq!(by_action[0].evidence_id.as_deref(), Some("ev-1"));

        assert_eq!(log.query(&AuditFilter::default()).len(), 3);
    }

    #[test]
    fn test_filtered_subset_still_verifies() {
        let log = sample_log();
        let subset = log.query(&AuditFilter {
            investigation_id: Some("inv-1".into()),
            ..Default::default()
        });
        assert!(verify_entries(&subset).valid);
    }

    #[test]
    fn test_audit_log_jsonl() {
        let log = sample_log();
        let jsonl = AuditLog::to_jsonl(log.entries());
        let parsed = AuditLog::from_jsonl(&jsonl).unwrap();
        assert_eq!(parsed.entries(), log.entries());
        assert!(parsed.verify_chain().valid);
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(
            "package_sealed".parse::<AuditAction>().unwrap(),
            AuditAction::PackageSealed
        );
        assert!("package-exploded".parse::<AuditAction>().is_err());
    }
}
