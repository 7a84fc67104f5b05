//! Export rendering: machine-readable JSON and the Markdown compliance report.

use crate::config::ExportFormat;
use custodian_common::{Error, Result};
use custodian_schema::{AuditEntry, CustodyEvent, EvidenceExport, EvidenceRecord, PackageExport};
use serde_json::Value;
use std::fmt::{self, Write};

/// Render a package export in the requested format.
pub fn render_package(export: &PackageExport, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(export)?),
        ExportFormat::Compliance => {
            let mut out = String::new();
            write_package_report(&mut out, export)
                .map_err(|e| Error::Other(format!("failed to render report: {}", e)))?;
            Ok(out)
        }
    }
}

/// Render a single-item export in the requested format.
pub fn render_evidence(export: &EvidenceExport, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(export)?),
        ExportFormat::Compliance => {
            let mut out = String::new();
            write_evidence_report(&mut out, export)
                .map_err(|e| Error::Other(format!("failed to render report: {}", e)))?;
            Ok(out)
        }
    }
}

fn write_package_report(out: &mut String, export: &PackageExport) -> fmt::Result {
    let package = &export.package;

    writeln!(out, "# Evidence Package Compliance Report")?;
    writeln!(out)?;
    writeln!(out, "| Field | Value |")?;
    writeln!(out, "|-------|-------|")?;
    writeln!(out, "| Package | {} |", cell(&package.name))?;
    writeln!(out, "| Package ID | `{}` |", package.id)?;
    writeln!(out, "| Case | {} |", opt(package.case_id.as_deref()))?;
    writeln!(out, "| Investigation | {} |", opt(package.investigation_id.as_deref()))?;
    writeln!(out, "| Created | {} by {} |", package.created_at, cell(&package.created_by))?;
    match (&package.sealed_at, &package.sealed_by) {
        (Some(at), Some(by)) => writeln!(out, "| Sealed | {} by {} |", at, cell(by))?,
        _ => writeln!(out, "| Sealed | no |")?,
    }
    writeln!(out, "| Hash algorithm | {} |", package.hash_algorithm)?;
    writeln!(out, "| Package hash | {} |", opt_code(package.package_hash.as_deref()))?;
    writeln!(out, "| Members | {} |", package.members.len())?;
    writeln!(out, "| Exported | {} by {} |", export.exported_at, cell(&export.exported_by))?;
    writeln!(out, "| Schema version | {} |", export.schema_version)?;
    if let Some(description) = &package.description {
        writeln!(out)?;
        writeln!(out, "{}", description)?;
    }
    if !package.tags.is_empty() {
        writeln!(out)?;
        writeln!(out, "Tags: {}", package.tags.join(", "))?;
    }

    writeln!(out)?;
    writeln!(out, "## Integrity Verification")?;
    writeln!(out)?;
    match &export.verification {
        Some(v) => {
            writeln!(
                out,
                "Package hash: **{}**",
                if v.valid { "VALID" } else { "INVALID" }
            )?;
            writeln!(out)?;
            writeln!(out, "- Expected: `{}`", v.expected_hash)?;
            writeln!(out, "- Recomputed: `{}`", v.actual_hash)?;
            writeln!(out, "- Members checked: {}", v.member_count)?;
            for id in &v.divergent_members {
                writeln!(out, "- Member `{}` no longer matches its hash at seal time", id)?;
            }
            for id in &v.tampered_members {
                writeln!(out, "- Member `{}` payload does not match its content hash", id)?;
            }
        }
        None => writeln!(out, "Package is not sealed; no package hash to verify.")?,
    }

    writeln!(out)?;
    writeln!(out, "## Membership")?;
    writeln!(out)?;
    if package.members.is_empty() {
        writeln!(out, "No members.")?;
    } else {
        writeln!(out, "| Position | Evidence ID | Content hash at seal |")?;
        writeln!(out, "|----------|-------------|----------------------|")?;
        for (i, id) in package.members.iter().enumerate() {
            writeln!(
                out,
                "| {} | `{}` | {} |",
                i,
                id,
                opt_code(package.sealed_member_hashes.get(i).map(String::as_str))
            )?;
        }
    }

    writeln!(out)?;
    writeln!(out, "## Evidence Items")?;
    writeln!(out)?;
    writeln!(out, "| # | ID | Type | Content hash | Size | Collected | Sealed |")?;
    writeln!(out, "|---|----|------|--------------|------|-----------|--------|")?;
    for (i, record) in export.evidence.iter().enumerate() {
        writeln!(
            out,
            "| {} | `{}` | {} | `{}` | {} | {} by {} | {} |",
            i + 1,
            record.id,
            record.evidence_type,
            record.content_hash,
            record.size_bytes,
            record.collected_at,
            cell(&record.collected_by),
            if record.sealed { "yes" } else { "no" }
        )?;
    }

    for record in &export.evidence {
        writeln!(out)?;
        writeln!(out, "### Evidence `{}`", record.id)?;
        writeln!(out)?;
        write_record(out, record)?;
        writeln!(out)?;
        write_custody(out, record)?;
    }

    if !package.annotations.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Annotations")?;
        writeln!(out)?;
        for annotation in &package.annotations {
            write!(
                out,
                "- {} ({}): {}",
                cell(&annotation.author),
                annotation.created_at,
                annotation.text
            )?;
            if !annotation.evidence_ids.is_empty() {
                write!(out, " [{}]", annotation.evidence_ids.join(", "))?;
            }
            writeln!(out)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "## Audit Trail")?;
    writeln!(out)?;
    writeln!(
        out,
        "Global audit chain: {} ({} entries, head `{}`)",
        if export.audit_chain.valid { "intact" } else { "BROKEN" },
        export.audit_chain.entries,
        export.audit_chain.head_hash
    )?;
    if let Some(seq) = export.audit_chain.broken_at {
        writeln!(out)?;
        writeln!(out, "First broken entry: {}", seq)?;
    }
    writeln!(out)?;
    write_audit(out, &export.audit_trail)?;

    writeln!(out)?;
    writeln!(out, "## Certification")?;
    writeln!(out)?;
    writeln!(out, "{}", export.certification.statement)?;
    writeln!(out)?;
    writeln!(
        out,
        "Integrity verified at export: {}",
        if export.certification.integrity_verified { "yes" } else { "NO" }
    )?;
    writeln!(out, "Signed: {}", export.certification.certified_by)?;
    writeln!(out, "Date: {}", export.certification.certified_at)?;
    Ok(())
}

fn write_evidence_report(out: &mut String, export: &EvidenceExport) -> fmt::Result {
    let record = &export.evidence;

    writeln!(out, "# Evidence Compliance Report")?;
    writeln!(out)?;
    write_record(out, record)?;
    writeln!(out)?;
    writeln!(
        out,
        "Integrity: {}",
        if export.integrity_verified { "verified" } else { "MISMATCH" }
    )?;
    writeln!(out, "Exported: {} by {}", export.exported_at, export.exported_by)?;
    writeln!(out, "Schema version: {}", export.schema_version)?;

    writeln!(out)?;
    write_custody(out, record)?;

    writeln!(out)?;
    writeln!(out, "## Audit Trail")?;
    writeln!(out)?;
    write_audit(out, &export.audit_trail)?;
    Ok(())
}

/// Field table for one evidence record, including capture metadata and tags.
fn write_record(out: &mut String, record: &EvidenceRecord) -> fmt::Result {
    let metadata = &record.metadata;

    writeln!(out, "| Field | Value |")?;
    writeln!(out, "|-------|-------|")?;
    writeln!(out, "| Evidence ID | `{}` |", record.id)?;
    writeln!(out, "| Type | {} |", record.evidence_type)?;
    writeln!(out, "| Case | {} |", opt(record.case_id.as_deref()))?;
    writeln!(out, "| Investigation | {} |", opt(record.investigation_id.as_deref()))?;
    writeln!(out, "| {} | `{}` |", record.hash_algorithm, record.content_hash)?;
    writeln!(out, "| Size | {} bytes |", record.size_bytes)?;
    writeln!(out, "| Collected | {} by {} |", record.collected_at, cell(&record.collected_by))?;
    match (&record.sealed_at, &record.sealed_by) {
        (Some(at), Some(by)) => writeln!(out, "| Sealed | {} by {} |", at, cell(by))?,
        _ => writeln!(out, "| Sealed | no |")?,
    }
    writeln!(out, "| Source URL | {} |", opt(metadata.source_url.as_deref()))?;
    writeln!(out, "| Title | {} |", opt(metadata.title.as_deref()))?;
    writeln!(out, "| User agent | {} |", opt(metadata.user_agent.as_deref()))?;
    if let Some(full_page) = metadata.full_page {
        writeln!(out, "| Full page | {} |", if full_page { "yes" } else { "no" })?;
    }
    if let Some(format) = &metadata.archive_format {
        let format = serde_json::to_value(format).map_err(|_| fmt::Error)?;
        writeln!(out, "| Archive format | {} |", format.as_str().unwrap_or_default())?;
    }
    for note in &metadata.notes {
        writeln!(out, "| Note | {} |", cell(note))?;
    }
    for (key, value) in &metadata.extra {
        writeln!(out, "| {} | {} |", cell(key), cell(value))?;
    }
    let tags = if record.tags.is_empty() {
        "-".to_string()
    } else {
        cell(&record.tags.join(", "))
    };
    writeln!(out, "| Tags | {} |", tags)?;

    if let Some(payload) = &record.payload {
        let wire = serde_json::to_value(payload).map_err(|_| fmt::Error)?;
        writeln!(out)?;
        writeln!(out, "Payload (`{}`):", payload.encoding())?;
        writeln!(out)?;
        writeln!(out, "```")?;
        match &wire["data"] {
            Value::String(data) => writeln!(out, "{}", data)?,
            data => writeln!(
                out,
                "{}",
                serde_json::to_string_pretty(data).map_err(|_| fmt::Error)?
            )?,
        }
        writeln!(out, "```")?;
    }
    Ok(())
}

fn write_custody(out: &mut String, record: &EvidenceRecord) -> fmt::Result {
    writeln!(out, "### Chain of Custody: `{}`", record.id)?;
    writeln!(out)?;
    writeln!(out, "| # | Time | Action | Actor | Detail |")?;
    writeln!(out, "|---|------|--------|-------|--------|")?;
    for (i, event) in record.custody_chain.iter().enumerate() {
        write_custody_row(out, i + 1, event)?;
    }
    writeln!(out)?;
    writeln!(out, "Custody digest: `{}`", record.custody_digest)
}

fn write_custody_row(out: &mut String, n: usize, event: &CustodyEvent) -> fmt::Result {
    writeln!(
        out,
        "| {} | {} | {} | {} | {} |",
        n,
        event.timestamp,
        event.action,
        cell(&event.actor),
        detail(&event.detail)
    )
}

fn write_audit(out: &mut String, entries: &[AuditEntry]) -> fmt::Result {
    if entries.is_empty() {
        return writeln!(out, "No audit entries.");
    }
    writeln!(
        out,
        "| Seq | Time | Action | Actor | Investigation | Evidence | Package | Detail | Previous hash | Entry hash |"
    )?;
    writeln!(
        out,
        "|-----|------|--------|-------|---------------|----------|---------|--------|---------------|------------|"
    )?;
    for entry in entries {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} | `{}` | `{}` |",
            entry.seq,
            entry.timestamp,
            entry.action,
            cell(&entry.actor),
            opt(entry.investigation_id.as_deref()),
            opt(entry.evidence_id.as_deref()),
            opt(entry.package_id.as_deref()),
            detail(&entry.detail),
            entry.prev_hash,
            entry.entry_hash
        )?;
    }
    Ok(())
}

/// Escape table separators in free text.
fn cell(value: &str) -> String {
    value.replace('|', "\\|")
}

fn opt(value: Option<&str>) -> String {
    value.map(cell).unwrap_or_else(|| "-".to_string())
}

/// Compact JSON of an event detail, or `-` when there is none.
fn detail(value: &Value) -> String {
    if value.is_null() {
        "-".to_string()
    } else {
        format!("`{}`", cell(&value.to_string()))
    }
}

fn opt_code(value: Option<&str>) -> String {
    value
        .map(|v| format!("`{}`", v))
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_common::{HashAlgorithm, Timestamp};
    use custodian_schema::audit::verify_entries;
    use custodian_schema::{
        AuditAction, AuditLog, AuditRecord, Certification, EvidenceItem, EvidenceMetadata,
        EvidencePackage, EvidenceType, Payload, EXPORT_SCHEMA_VERSION,
    };
    use serde_json::json;

    fn export() -> PackageExport {
        let mut item = EvidenceItem::collect(
            "ev-1",
            EvidenceType::Screenshot,
            Payload::Binary(b"<png-bytes>".to_vec()),
            HashAlgorithm::Sha256,
            EvidenceMetadata {
                source_url: Some("https://example.com/login".into()),
                title: Some("Sign in".into()),
                user_agent: Some("Mozilla/5.0".into()),
                notes: vec!["captured after redirect".into()],
                ..Default::default()
            },
            vec!["login".into(), "phishing".into()],
            "investigator",
            None,
            None,
        )
        .unwrap();
        item.record_export("clerk", json!({ "package_id": "pkg-1", "format": "compliance" }));

        let mut log = AuditLog::new();
        log.record(
            AuditRecord::new(AuditAction::EvidenceCollected, "investigator")
                .evidence("ev-1")
                .detail(json!({ "content_hash": item.content_hash })),
        );
        log.record(AuditRecord::new(AuditAction::PackageCreated, "investigator").package("pkg-1"));
        let mut package = EvidencePackage::new(
            "pkg-1",
            "Login | captures",
            None,
            Some("CASE-001".into()),
            None,
            "investigator",
            vec![],
            HashAlgorithm::Sha256,
        )
        .unwrap();
        package.add_member("ev-1").unwrap();
        package
            .annotate("analyst", "matches report", vec!["ev-1".into()])
            .unwrap();
        package
            .seal("investigator", vec![item.content_hash.clone()])
            .unwrap();

        let now = Timestamp::now();
        PackageExport {
            schema_version: EXPORT_SCHEMA_VERSION.to_string(),
            exported_at: now,
            exported_by: "clerk".into(),
            certification: Certification::for_package(&package, "clerk", now, true),
            package,
            evidence: vec![EvidenceRecord::from_item(&item, false)],
            verification: None,
            audit_chain: verify_entries(log.entries()),
            audit_trail: log.entries().to_vec(),
            includes_payload: false,
        }
    }

    #[test]
    fn test_compliance_report_sections() {
        let export = export();
        let report = render_package(&export, ExportFormat::Compliance).unwrap();

        assert!(report.starts_with("# Evidence Package Compliance Report"));
        assert!(report.contains("Login \\| captures"));
        assert!(report.contains(export.package.package_hash.as_deref().unwrap()));
        assert!(report.contains("### Chain of Custody: `ev-1`"));
        assert!(report.contains("## Annotations"));
        assert!(report.contains("matches report [ev-1]"));
        assert!(report.contains("I, clerk, certify"));
    }

    #[test]
    fn test_compliance_report_carries_document_content() {
        let export = export();
        let report = render_package(&export, ExportFormat::Compliance).unwrap();

        assert!(report.contains("| Source URL | https://example.com/login |"));
        assert!(report.contains("| Title | Sign in |"));
        assert!(report.contains("| User agent | Mozilla/5.0 |"));
        assert!(report.contains("| Note | captured after redirect |"));
        assert!(report.contains("| Tags | login, phishing |"));
        assert!(report.contains(r#""package_id":"pkg-1""#));
        assert!(report.contains(r#""format":"compliance""#));
        assert!(report.contains(&export.package.sealed_member_hashes[0]));
        for entry in &export.audit_trail {
            assert!(report.contains(&format!("`{}`", entry.entry_hash)));
            assert!(report.contains(&format!("`{}`", entry.prev_hash)));
        }
    }

    #[test]
    fn test_evidence_report_renders_payload_when_included() {
        let export = export();
        let mut record = export.evidence[0].clone();
        record.payload = Some(Payload::Text("<html>login</html>".into()));
        let evidence = EvidenceExport {
            schema_version: EXPORT_SCHEMA_VERSION.to_string(),
            exported_at: export.exported_at,
            exported_by: "clerk".into(),
            evidence: record,
            integrity_verified: true,
            audit_trail: export.audit_trail.clone(),
            includes_payload: true,
        };
        let report = render_evidence(&evidence, ExportFormat::Compliance).unwrap();
        assert!(report.starts_with("# Evidence Compliance Report"));
        assert!(report.contains("https://example.com/login"));
        assert!(report.contains("Payload (`text`):"));
        assert!(report.contains("<html>login</html>"));
        assert!(report.contains("Integrity: verified"));
    }

    #[test]
    fn test_json_render_parses_back() {
        let export = export();
        let content = render_package(&export, ExportFormat::Json).unwrap();
        let parsed: PackageExport = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, export);
    }
}
