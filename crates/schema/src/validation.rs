//! Export document validation utilities.
//!
//! Two layers: structural validation against the bundled JSON schemas, and
//! integrity checks that recompute every hash an export carries.

use crate::audit::verify_entries;
use crate::custody::CustodyChain;
use crate::package::compute_package_hash;
use crate::report::PackageExport;
use crate::schema;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Validation error type.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Schema validation failed: {0}")]
    SchemaError(String),

    #[error("Package hash mismatch: expected {expected}, got {actual}")]
    PackageHashMismatch { expected: String, actual: String },

    #[error("Content hash mismatch for {evidence_id}: expected {expected}, got {actual}")]
    ContentHashMismatch {
        evidence_id: String,
        expected: String,
        actual: String,
    },

    #[error("Custody chain of {0} is malformed")]
    MalformedCustodyChain(String),

    #[error("Custody digest mismatch for {0}")]
    CustodyDigestMismatch(String),

    #[error("Package member {0} has no evidence record")]
    MissingEvidenceRecord(String),

    #[error("Audit trail broken at entry {0}")]
    BrokenAuditTrail(u64),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Archive file missing: {0}")]
    MissingFile(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result of export validation.
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        for error in other.errors {
            self.add_error(error);
        }
        self.warnings.extend(other.warnings);
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_against(schema_value: &Value, instance: &Value) -> Result<ValidationResult, ValidationError> {
    let mut result = ValidationResult::new();

    let compiled = JSONSchema::compile(schema_value)
        .map_err(|e| ValidationError::SchemaError(e.to_string()))?;

    let validation = compiled.validate(instance);
    if let Err(errors) = validation {
        for error in errors {
            result.add_error(ValidationError::SchemaError(format!(
                "{} at {}",
                error, error.instance_path
            )));
        }
    }

    Ok(result)
}

/// Validate a package export document against the JSON schema.
pub fn validate_package_export(document: &Value) -> Result<ValidationResult, ValidationError> {
    validate_against(&schema::package_export_schema(), document)
}

/// Validate one exported audit entry against the JSON schema.
pub fn validate_audit_entry(entry: &Value) -> Result<ValidationResult, ValidationError> {
    validate_against(&schema::audit_entry_schema(), entry)
}

/// Recompute every hash carried by a package export.
pub fn check_export_integrity(export: &PackageExport) -> ValidationResult {
    let mut result = ValidationResult::new();
    let records: HashMap<&str, _> = export
        .evidence
        .iter()
        .map(|r| (r.id.as_str(), r))
        .collect();

    for record in &export.evidence {
        let chain = CustodyChain::from_events(record.custody_chain.clone());
        if !chain.is_well_formed() {
            result.add_error(ValidationError::MalformedCustodyChain(record.id.clone()));
        }
        if chain.digest(record.hash_algorithm) != record.custody_digest {
            result.add_error(ValidationError::CustodyDigestMismatch(record.id.clone()));
        }
        if let Some(payload) = &record.payload {
            let actual = record.hash_algorithm.digest(&payload.canonical_bytes());
            if actual != record.content_hash {
                result.add_error(ValidationError::ContentHashMismatch {
                    evidence_id: record.id.clone(),
                    expected: record.content_hash.clone(),
                    actual,
                });
            }
        }
    }

    let mut member_hashes = Vec::with_capacity(export.package.members.len());
    for member in &export.package.members {
        match records.get(member.as_str()) {
            Some(record) => member_hashes.push(record.content_hash.clone()),
            None => result.add_error(ValidationError::MissingEvidenceRecord(member.clone())),
        }
    }

    match &export.package.package_hash {
        Some(expected) if member_hashes.len() == export.package.members.len() => {
            let actual = compute_package_hash(export.package.hash_algorithm, &member_hashes);
            if actual != *expected {
                result.add_error(ValidationError::PackageHashMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Some(_) => {}
        None => result.add_warning(format!("package {} is not sealed", export.package.id)),
    }

    let trail = verify_entries(&export.audit_trail);
    if let Some(seq) = trail.broken_at {
        result.add_error(ValidationError::BrokenAuditTrail(seq));
    }

    if !export.includes_payload {
        result.add_warning("payloads not embedded; content hashes taken as recorded".to_string());
    }

    result
}
