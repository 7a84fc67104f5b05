//! Evidence packages: ordered bundles sealed under one aggregate hash.
//!
//! The package hash is the digest of the member content hashes (lowercase
//! hex, as stored) concatenated in membership order with no separator.
//! Order is part of what the hash attests: the same members in a different
//! order produce a different package hash.

use custodian_common::{EntityKind, Error, HashAlgorithm, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// Free-text note attached to a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub author: String,
    pub text: String,
    /// Members this note refers to, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_ids: Vec<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePackage {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub case_id: Option<String>,
    pub investigation_id: Option<String>,
    pub created_by: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Evidence ids in bundling order. Duplicates are kept.
    pub members: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    pub hash_algorithm: HashAlgorithm,
    pub sealed: bool,
    pub sealed_at: Option<Timestamp>,
    pub sealed_by: Option<String>,
    pub package_hash: Option<String>,
    /// Member content hashes as they were when the package was sealed.
    #[serde(default)]
    pub sealed_member_hashes: Vec<String>,
}

/// Current state of one member, as seen by the ledger at verification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberState {
    pub evidence_id: String,
    pub content_hash: String,
    /// Whether the member's payload still matches its content hash.
    pub intact: bool,
}

/// Outcome of recomputing a sealed package's hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVerification {
    pub package_id: String,
    /// Recomputed package hash equals the stored one.
    pub valid: bool,
    pub hash_algorithm: HashAlgorithm,
    pub expected_hash: String,
    pub actual_hash: String,
    pub member_count: usize,
    /// Members whose content hash differs from the one recorded at seal time.
    pub divergent_members: Vec<String>,
    /// Members whose stored payload no longer matches their content hash.
    pub tampered_members: Vec<String>,
}

impl PackageVerification {
    /// Valid hash and every member payload intact.
    pub fn is_fully_intact(&self) -> bool {
        self.valid && self.tampered_members.is_empty()
    }
}

/// Order-sensitive digest over member content hashes.
pub fn compute_package_hash(algorithm: HashAlgorithm, member_hashes: &[String]) -> String {
    algorithm.digest_parts(member_hashes.iter().map(|h| h.as_bytes()))
}

impl EvidencePackage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        case_id: Option<String>,
        investigation_id: Option<String>,
        created_by: impl Into<String>,
        tags: Vec<String>,
        hash_algorithm: HashAlgorithm,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("package name is required".into()));
        }
        Ok(Self {
            id: id.into(),
            name,
            description,
            case_id,
            investigation_id,
            created_by: created_by.into(),
            created_at: Timestamp::now(),
            tags,
            members: Vec::new(),
            annotations: Vec::new(),
            hash_algorithm,
            sealed: false,
            sealed_at: None,
            sealed_by: None,
            package_hash: None,
            sealed_member_hashes: Vec::new(),
        })
    }

    /// Append a member; returns its position.
    pub fn add_member(&mut self, evidence_id: impl Into<String>) -> Result<usize> {
        if self.sealed {
            return Err(Error::already_sealed(EntityKind::Package, &self.id));
        }
        self.members.push(evidence_id.into());
        Ok(self.members.len() - 1)
    }

    pub fn annotate(
        &mut self,
        author: impl Into<String>,
        text: impl Into<String>,
        evidence_ids: Vec<String>,
    ) -> Result<&Annotation> {
        if self.sealed {
            return Err(Error::immutable(EntityKind::Package, &self.id));
        }
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidArgument("annotation text is required".into()));
        }
        let author = author.into();
        if author.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "annotation author is required".into(),
            ));
        }
        if let Some(missing) = evidence_ids.iter().find(|id| !self.members.contains(id)) {
            return Err(Error::InvalidArgument(format!(
                "evidence {} is not a member of package {}",
                missing, self.id
            )));
        }

        let created_at = Timestamp::now_after(self.annotations.last().map(|a| a.created_at));
        self.annotations.push(Annotation {
            author,
            text,
            evidence_ids,
            created_at,
        });
        Ok(&self.annotations[self.annotations.len() - 1])
    }

    /// Lock membership and fix the package hash.
    ///
    /// `member_hashes` are the current content hashes of `members`, in the
    /// same order.
    pub fn seal(&mut self, actor: impl Into<String>, member_hashes: Vec<String>) -> Result<String> {
        if self.sealed {
            return Err(Error::already_sealed(EntityKind::Package, &self.id));
        }
        if self.members.is_empty() {
            return Err(Error::InvalidState(format!(
                "package {} has no members to seal",
                self.id
            )));
        }
        if member_hashes.len() != self.members.len() {
            return Err(Error::InvalidArgument(format!(
                "expected {} member hashes, got {}",
                self.members.len(),
                member_hashes.len()
            )));
        }

        let package_hash = compute_package_hash(self.hash_algorithm, &member_hashes);
        self.sealed = true;
        self.sealed_at = Some(Timestamp::now_after(Some(self.created_at)));
        self.sealed_by = Some(actor.into());
        self.package_hash = Some(package_hash.clone());
        self.sealed_member_hashes = member_hashes;
        Ok(package_hash)
    }

    /// Recompute the package hash from the members' current state.
    pub fn verify(&self, members: &[MemberState]) -> Result<PackageVerification> {
        let expected_hash = match (&self.package_hash, self.sealed) {
            (Some(hash), true) => hash.clone(),
            _ => {
                return Err(Error::InvalidState(format!(
                    "package {} is not sealed",
                    self.id
                )))
            }
        };

        let current: Vec<String> = members.iter().map(|m| m.content_hash.clone()).collect();
        let actual_hash = compute_package_hash(self.hash_algorithm, &current);

        let divergent_members = members
            .iter()
            .enumerate()
            .filter(|(i, m)| self.sealed_member_hashes.get(*i) != Some(&m.content_hash))
            .map(|(_, m)| m.evidence_id.clone())
            .collect();
        let tampered_members = members
            .iter()
            .filter(|m| !m.intact)
            .map(|m| m.evidence_id.clone())
            .collect();

        Ok(PackageVerification {
            package_id: self.id.clone(),
            valid: actual_hash == expected_hash,
            hash_algorithm: self.hash_algorithm,
            expected_hash,
            actual_hash,
            member_count: members.len(),
            divergent_members,
            tampered_members,
        })
    }
}
