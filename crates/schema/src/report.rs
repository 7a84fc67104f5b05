//! Export document types: self-contained reports for external verification.

use crate::audit::{AuditEntry, ChainVerification};
use crate::evidence::EvidenceRecord;
use crate::package::{EvidencePackage, PackageVerification};
use custodian_common::{HashAlgorithm, Timestamp};
use serde::{Deserialize, Serialize};

/// Schema version for forward compatibility.
pub const EXPORT_SCHEMA_VERSION: &str = "1.0.0";

/// Attestation placed at the end of every package export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certification {
    pub statement: String,
    pub certified_by: String,
    pub certified_at: Timestamp,
    pub package_hash: Option<String>,
    pub hash_algorithm: HashAlgorithm,
    /// Outcome of verifying the package immediately before export.
    pub integrity_verified: bool,
}

impl Certification {
    pub fn for_package(
        package: &EvidencePackage,
        certified_by: &str,
        certified_at: Timestamp,
        integrity_verified: bool,
    ) -> Self {
        let statement = match &package.package_hash {
            Some(hash) => format!(
                "I, {}, certify that evidence package \"{}\" ({}) containing {} item(s) was \
                 sealed by {} and that its {} package hash {} was {} against the ledger at {}.",
                certified_by,
                package.name,
                package.id,
                package.members.len(),
                package.sealed_by.as_deref().unwrap_or("unknown"),
                package.hash_algorithm,
                hash,
                if integrity_verified {
                    "verified"
                } else {
                    "NOT verified"
                },
                certified_at
            ),
            None => format!(
                "I, {}, certify that this export of evidence package \"{}\" ({}) reflects the \
                 ledger at {}. The package is not sealed; its contents may still change.",
                certified_by, package.name, package.id, certified_at
            ),
        };

        Self {
            statement,
            certified_by: certified_by.to_string(),
            certified_at,
            package_hash: package.package_hash.clone(),
            hash_algorithm: package.hash_algorithm,
            integrity_verified,
        }
    }
}

/// Complete machine-readable export of one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageExport {
    pub schema_version: String,
    pub exported_at: Timestamp,
    pub exported_by: String,
    pub package: EvidencePackage,
    /// One record per distinct member, in first-membership order.
    pub evidence: Vec<EvidenceRecord>,
    /// Present when the package is sealed.
    pub verification: Option<PackageVerification>,
    /// Audit entries touching the package or any of its members.
    pub audit_trail: Vec<AuditEntry>,
    pub audit_chain: ChainVerification,
    pub certification: Certification,
    pub includes_payload: bool,
}

/// Machine-readable export of a single evidence item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceExport {
    pub schema_version: String,
    pub exported_at: Timestamp,
    pub exported_by: String,
    pub evidence: EvidenceRecord,
    /// Whether the payload matched its content hash at export time.
    pub integrity_verified: bool,
    pub audit_trail: Vec<AuditEntry>,
    pub includes_payload: bool,
}
