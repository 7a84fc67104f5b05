//! Evidence items: one captured artifact, its fingerprint and its custody.

use crate::custody::{CustodyAction, CustodyChain, CustodyEvent};
use crate::payload::Payload;
use custodian_common::{EntityKind, Error, HashAlgorithm, Result, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Kind of captured artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// Rendered page pixels.
    Screenshot,
    /// Archived page (MHTML, HTML, WARC, PDF).
    PageArchive,
    /// HTTP archive of network traffic.
    NetworkCapture,
    /// Serialized DOM tree.
    DomSnapshot,
    /// Browser console output.
    ConsoleLog,
    /// Cookie jar contents.
    CookieSet,
    /// Local/session storage key-value dump.
    StorageDump,
}

impl EvidenceType {
    pub const ALL: [EvidenceType; 7] = [
        EvidenceType::Screenshot,
        EvidenceType::PageArchive,
        EvidenceType::NetworkCapture,
        EvidenceType::DomSnapshot,
        EvidenceType::ConsoleLog,
        EvidenceType::CookieSet,
        EvidenceType::StorageDump,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::Screenshot => "screenshot",
            EvidenceType::PageArchive => "page_archive",
            EvidenceType::NetworkCapture => "network_capture",
            EvidenceType::DomSnapshot => "dom_snapshot",
            EvidenceType::ConsoleLog => "console_log",
            EvidenceType::CookieSet => "cookie_set",
            EvidenceType::StorageDump => "storage_dump",
        }
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "screenshot" => Ok(EvidenceType::Screenshot),
            "page_archive" | "archive" => Ok(EvidenceType::PageArchive),
            "network_capture" | "har" => Ok(EvidenceType::NetworkCapture),
            "dom_snapshot" | "dom" => Ok(EvidenceType::DomSnapshot),
            "console_log" | "console" => Ok(EvidenceType::ConsoleLog),
            "cookie_set" | "cookies" => Ok(EvidenceType::CookieSet),
            "storage_dump" | "storage" => Ok(EvidenceType::StorageDump),
            "" => Err(Error::InvalidArgument("evidence type is required".into())),
            _ => Err(Error::InvalidArgument(format!(
                "unknown evidence type: {}",
                s
            ))),
        }
    }
}

/// Page archive container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Mhtml,
    Html,
    Warc,
    Pdf,
}

/// Descriptive capture context. Never part of the content hash.
///
/// Unknown keys are rejected; free-form context goes in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Whether a screenshot covers the full scrollable page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_page: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_format: Option<ArchiveFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// One captured artifact with its integrity metadata and custody history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    pub evidence_type: EvidenceType,
    pub payload: Payload,
    /// Digest of the payload's canonical bytes, fixed at capture time.
    pub content_hash: String,
    pub hash_algorithm: HashAlgorithm,
    pub size_bytes: u64,
    pub metadata: EvidenceMetadata,
    pub tags: BTreeSet<String>,
    pub custody: CustodyChain,
    pub case_id: Option<String>,
    pub investigation_id: Option<String>,
    pub collected_at: Timestamp,
    pub collected_by: String,
    pub sealed: bool,
    pub sealed_at: Option<Timestamp>,
    pub sealed_by: Option<String>,
}

impl EvidenceItem {
    /// Capture a new item: fingerprint the payload and open its custody chain.
    #[allow(clippy::too_many_arguments)]
    pub fn collect(
        id: impl Into<String>,
        evidence_type: EvidenceType,
        payload: Payload,
        hash_algorithm: HashAlgorithm,
        metadata: EvidenceMetadata,
        tags: impl IntoIterator<Item = String>,
        actor: impl Into<String>,
        case_id: Option<String>,
        investigation_id: Option<String>,
    ) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::InvalidArgument(
                "evidence payload must not be empty".into(),
            ));
        }

        let actor = actor.into();
        let content_hash = hash_algorithm.digest(&payload.canonical_bytes());
        let size_bytes = payload.size_bytes();
        let custody = CustodyChain::start(
            actor.clone(),
            json!({
                "content_hash": content_hash,
                "hash_algorithm": hash_algorithm,
            }),
        );
        let collected_at = custody.events()[0].timestamp;

        Ok(Self {
            id: id.into(),
            evidence_type,
            payload,
            content_hash,
            hash_algorithm,
            size_bytes,
            metadata,
            tags: normalize_tags(tags),
            custody,
            case_id,
            investigation_id,
            collected_at,
            collected_by: actor,
            sealed: false,
            sealed_at: None,
            sealed_by: None,
        })
    }

    /// Recompute the digest over the currently stored payload using the
    /// recorded algorithm.
    pub fn compute_hash(&self) -> String {
        self.hash_algorithm.digest(&self.payload.canonical_bytes())
    }

    /// Whether the stored payload still matches the recorded hash.
    pub fn is_intact(&self) -> bool {
        self.compute_hash() == self.content_hash
    }

    /// Verify the payload and record the outcome in the custody chain.
    ///
    /// A mismatch is a reported outcome, not an error.
    pub fn record_verification(&mut self, actor: impl Into<String>) -> bool {
        let actual = self.compute_hash();
        let verified = actual == self.content_hash;
        let action = if verified {
            CustodyAction::Verified
        } else {
            CustodyAction::VerificationFailed
        };
        self.custody.append(
            action,
            actor,
            json!({
                "verified": verified,
                "expected_hash": self.content_hash,
                "actual_hash": actual,
            }),
        );
        verified
    }

    pub fn record_access(&mut self, actor: impl Into<String>) -> &CustodyEvent {
        self.custody.append(CustodyAction::Accessed, actor, Value::Null)
    }

    pub fn record_export(&mut self, actor: impl Into<String>, detail: Value) -> &CustodyEvent {
        self.custody.append(CustodyAction::Exported, actor, detail)
    }

    /// Add tags; returns how many were new. Fails once sealed.
    pub fn add_tags(&mut self, tags: impl IntoIterator<Item = String>) -> Result<usize> {
        if self.sealed {
            return Err(Error::already_sealed(EntityKind::Evidence, &self.id));
        }
        let before = self.tags.len();
        self.tags.extend(normalize_tags(tags));
        Ok(self.tags.len() - before)
    }

    /// Replace descriptive metadata. Fails once sealed.
    pub fn update_metadata(&mut self, metadata: EvidenceMetadata) -> Result<()> {
        if self.sealed {
            return Err(Error::immutable(EntityKind::Evidence, &self.id));
        }
        self.metadata = metadata;
        Ok(())
    }

    /// One-way transition to read-only.
    pub fn seal(&mut self, actor: impl Into<String>) -> Result<Timestamp> {
        if self.sealed {
            return Err(Error::already_sealed(EntityKind::Evidence, &self.id));
        }
        let actor = actor.into();
        let timestamp = self
            .custody
            .append(
                CustodyAction::Sealed,
                actor.clone(),
                json!({ "content_hash": self.content_hash }),
            )
            .timestamp;
        self.sealed = true;
        self.sealed_at = Some(timestamp);
        self.sealed_by = Some(actor);
        Ok(timestamp)
    }
}

fn normalize_tags(tags: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Serializable view of an evidence item: everything except the raw payload
/// unless it was explicitly requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: String,
    pub evidence_type: EvidenceType,
    pub content_hash: String,
    pub hash_algorithm: HashAlgorithm,
    pub size_bytes: u64,
    pub metadata: EvidenceMetadata,
    pub tags: Vec<String>,
    pub case_id: Option<String>,
    pub investigation_id: Option<String>,
    pub collected_at: Timestamp,
    pub collected_by: String,
    pub sealed: bool,
    pub sealed_at: Option<Timestamp>,
    pub sealed_by: Option<String>,
    pub custody_chain: Vec<CustodyEvent>,
    /// Digest of the custody chain at the time this record was taken.
    pub custody_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl EvidenceRecord {
    pub fn from_item(item: &EvidenceItem, include_payload: bool) -> Self {
        Self {
            id: item.id.clone(),
            evidence_type: item.evidence_type,
            content_hash: item.content_hash.clone(),
            hash_algorithm: item.hash_algorithm,
            size_bytes: item.size_bytes,
            metadata: item.metadata.clone(),
            tags: item.tags.iter().cloned().collect(),
            case_id: item.case_id.clone(),
            investigation_id: item.investigation_id.clone(),
            collected_at: item.collected_at,
            collected_by: item.collected_by.clone(),
            sealed: item.sealed,
            sealed_at: item.sealed_at,
            sealed_by: item.sealed_by.clone(),
            custody_chain: item.custody.events().to_vec(),
            custody_digest: item.custody.digest(item.hash_algorithm),
            payload: include_payload.then(|| item.payload.clone()),
        }
    }
}
