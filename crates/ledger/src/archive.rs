//! Export archives: a package export written to disk as a gzip tarball.
//!
//! Layout:
//! - `package.json`: the machine-readable export document
//! - `report.md`: the compliance report rendered from the same document
//! - `audit.jsonl`: the package's audit trail, one entry per line
//! - `checksums.json`: SHA-256 of each of the files above

use crate::config::ExportFormat;
use crate::export;
use anyhow::{Context, Result};
use custodian_common::hash::sha256_bytes;
use custodian_schema::validation::{self, ValidationError, ValidationResult};
use custodian_schema::{AuditEntry, AuditLog, PackageExport};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tar::{Archive, Builder};
use tracing::info;

pub const PACKAGE_FILE: &str = "package.json";
pub const REPORT_FILE: &str = "report.md";
pub const AUDIT_FILE: &str = "audit.jsonl";
pub const CHECKSUMS_FILE: &str = "checksums.json";

/// Contents of an export archive as read back from disk.
#[derive(Debug)]
pub struct ExportArchive {
    pub export: PackageExport,
    pub report: Option<String>,
    pub audit: Vec<AuditEntry>,
    pub checksums: BTreeMap<String, String>,
    /// Raw bytes of every member file, keyed by path.
    pub files: BTreeMap<String, Vec<u8>>,
}

/// Write a package export to a compressed tarball; returns the checksums.
pub fn write_export_archive(export: &PackageExport, path: &Path) -> Result<BTreeMap<String, String>> {
    let file = File::create(path).context("Failed to create export archive")?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut archive = Builder::new(encoder);

    let package_json = serde_json::to_string_pretty(export)?;
    let report = export::render_package(export, ExportFormat::Compliance)?;
    let audit_jsonl = AuditLog::to_jsonl(&export.audit_trail);

    let mut checksums = BTreeMap::new();
    for (name, content) in [
        (PACKAGE_FILE, package_json.as_bytes()),
        (REPORT_FILE, report.as_bytes()),
        (AUDIT_FILE, audit_jsonl.as_bytes()),
    ] {
        add_file_to_archive(&mut archive, name, content)?;
        checksums.insert(name.to_string(), sha256_bytes(content));
    }

    let checksums_json = serde_json::to_string_pretty(&checksums)?;
    add_file_to_archive(&mut archive, CHECKSUMS_FILE, checksums_json.as_bytes())?;

    archive
        .into_inner()
        .context("Failed to finish export archive")?
        .finish()
        .context("Failed to flush export archive")?;
    info!(
        package_id = %export.package.id,
        path = %path.display(),
        "Export archive written"
    );

    Ok(checksums)
}

fn add_file_to_archive<W: Write>(archive: &mut Builder<W>, path: &str, content: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    archive.append_data(&mut header, path, content)?;
    Ok(())
}

/// Read an export archive back from disk.
pub fn read_export_archive(path: &Path) -> Result<ExportArchive> {
    let file = File::open(path).context("Failed to open export archive")?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    let mut files = BTreeMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().to_string();
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        files.insert(name, content);
    }

    let export: PackageExport = serde_json::from_slice(
        files
            .get(PACKAGE_FILE)
            .context("Missing package.json in export archive")?,
    )
    .context("Invalid package.json")?;
    let checksums: BTreeMap<String, String> = match files.get(CHECKSUMS_FILE) {
        Some(content) => serde_json::from_slice(content).context("Invalid checksums.json")?,
        None => BTreeMap::new(),
    };
    let audit = match files.get(AUDIT_FILE) {
        Some(content) => AuditLog::from_jsonl(&String::from_utf8_lossy(content))
            .context("Invalid audit.jsonl")?
            .entries()
            .to_vec(),
        None => Vec::new(),
    };
    let report = files
        .get(REPORT_FILE)
        .map(|content| String::from_utf8_lossy(content).into_owned());

    Ok(ExportArchive {
        export,
        report,
        audit,
        checksums,
        files,
    })
}

/// Check an export archive end to end: file checksums, the export schema,
/// every hash the document carries, and the audit trail file.
pub fn verify_export_archive(path: &Path) -> Result<ValidationResult> {
    let archive = read_export_archive(path)?;
    let mut result = ValidationResult::new();

    if archive.checksums.is_empty() {
        result.add_error(ValidationError::MissingFile(CHECKSUMS_FILE.to_string()));
    }
    for (file, expected) in &archive.checksums {
        match archive.files.get(file) {
            Some(content) => {
                let actual = sha256_bytes(content);
                if actual != *expected {
                    result.add_error(ValidationError::ChecksumMismatch {
                        file: file.clone(),
                        expected: expected.clone(),
                        actual,
                    });
                }
            }
            None => result.add_error(ValidationError::MissingFile(file.clone())),
        }
    }

    // Schemas are checked against the bytes on disk; the parsed structs would
    // have defaulted any missing optional collections.
    if let Some(content) = archive.files.get(PACKAGE_FILE) {
        let document: serde_json::Value =
            serde_json::from_slice(content).context("Invalid package.json")?;
        result.merge(validation::validate_package_export(&document)?);
    }
    result.merge(validation::check_export_integrity(&archive.export));

    if archive.audit != archive.export.audit_trail {
        result.add_warning(format!(
            "{} does not match the audit trail embedded in {}",
            AUDIT_FILE, PACKAGE_FILE
        ));
    }
    if let Some(content) = archive.files.get(AUDIT_FILE) {
        let content = String::from_utf8_lossy(content);
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let value: serde_json::Value =
                serde_json::from_str(line).context("Invalid audit.jsonl line")?;
            result.merge(validation::validate_audit_entry(&value)?);
        }
    }

    Ok(result)
}
