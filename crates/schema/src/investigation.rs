//! Investigations: named case contexts that scope evidence collection.

use custodian_common::{Error, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestigationStatus {
    Active,
    Completed,
}

/// Running counters kept per investigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationStats {
    pub evidence_collected: u64,
    pub evidence_sealed: u64,
    pub packages_created: u64,
    pub packages_sealed: u64,
    pub verifications: u64,
    pub verification_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub investigator: Option<String>,
    pub case_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub status: InvestigationStatus,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub stats: InvestigationStats,
}

impl Investigation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        investigator: Option<String>,
        case_id: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "investigation name is required".into(),
            ));
        }
        Ok(Self {
            id: id.into(),
            name,
            description,
            investigator,
            case_id,
            metadata,
            status: InvestigationStatus::Active,
            created_at: Timestamp::now(),
            completed_at: None,
            stats: InvestigationStats::default(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == InvestigationStatus::Active
    }

    /// Fail unless new evidence or packages may still be attached.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "investigation {} is completed",
                self.id
            )))
        }
    }

    /// Transition active -> completed, exactly once.
    pub fn complete(&mut self) -> Result<Timestamp> {
        self.ensure_active()?;
        let now = Timestamp::now_after(Some(self.created_at));
        self.status = InvestigationStatus::Completed;
        self.completed_at = Some(now);
        Ok(now)
    }
}
