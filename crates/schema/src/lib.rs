//! Ledger schema definitions for custodian.
//!
//! This crate defines the data model of the evidence ledger: evidence
//! items and their custody chains, investigations, packages, the audit log,
//! and the export documents handed to external verifiers.

pub mod audit;
pub mod custody;
pub mod evidence;
pub mod investigation;
pub mod package;
pub mod payload;
pub mod report;
pub mod schema;
pub mod validation;

pub use audit::{AuditAction, AuditEntry, AuditFilter, AuditLog, AuditRecord, ChainVerification};
pub use custody::{CustodyAction, CustodyChain, CustodyEvent};
pub use evidence::{ArchiveFormat, EvidenceItem, EvidenceMetadata, EvidenceRecord, EvidenceType};
pub use investigation::{Investigation, InvestigationStats, InvestigationStatus};
pub use package::{
    compute_package_hash, Annotation, EvidencePackage, MemberState, PackageVerification,
};
pub use payload::Payload;
pub use report::{Certification, EvidenceExport, PackageExport, EXPORT_SCHEMA_VERSION};
pub use validation::{check_export_integrity, validate_package_export};
