//! The evidence manager: single authority over investigations, evidence,
//! packages and the audit log.
//!
//! All ledger state sits behind one `RwLock`. Every mutating operation
//! validates first, then applies its state change and the matching custody
//! and audit appends under a single write guard, so callers never observe a
//! half-applied change and a failed call leaves nothing behind. Reads share
//! the lock. Change notifications go out after the guard is released.

use crate::config::{ExportFormat, LedgerConfig};
use crate::export;
use crate::notify::{LedgerEvent, Notifier};
use custodian_common::id::{EVIDENCE_PREFIX, INVESTIGATION_PREFIX, PACKAGE_PREFIX};
use custodian_common::{EntityKind, Error, IdGenerator, Result, Timestamp};
use custodian_schema::audit::verify_entries;
use custodian_schema::{
    AuditAction, AuditEntry, AuditFilter, AuditLog, AuditRecord, Certification, ChainVerification,
    EvidenceExport, EvidenceItem, EvidenceMetadata, EvidencePackage, EvidenceRecord, EvidenceType,
    Investigation, InvestigationStats, InvestigationStatus, MemberState, PackageExport,
    PackageVerification, Payload, EXPORT_SCHEMA_VERSION,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Parameters for opening an investigation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewInvestigation {
    pub name: String,
    pub description: Option<String>,
    /// Lead investigator; also recorded as the actor of the creation.
    pub investigator: Option<String>,
    pub case_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl NewInvestigation {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Optional capture parameters. Every field defaults to empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectOptions {
    pub metadata: EvidenceMetadata,
    /// Defaults to the configured system actor.
    pub actor: Option<String>,
    pub tags: Vec<String>,
    /// Defaults to the investigation's case id.
    pub case_id: Option<String>,
    pub investigation_id: Option<String>,
}

/// Parameters for creating a package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPackage {
    pub name: String,
    pub description: Option<String>,
    pub case_id: Option<String>,
    pub investigation_id: Option<String>,
    pub actor: Option<String>,
    pub tags: Vec<String>,
}

impl NewPackage {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewAnnotation {
    pub author: String,
    pub text: String,
    pub evidence_ids: Vec<String>,
}

/// Parameters shared by all exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub actor: Option<String>,
    /// Embed raw payloads; defaults to the configured behavior.
    pub include_payload: Option<bool>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Json,
            actor: None,
            include_payload: None,
        }
    }
}

/// Read-only selection over evidence items. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceFilter {
    pub investigation_id: Option<String>,
    pub case_id: Option<String>,
    pub evidence_type: Option<EvidenceType>,
    pub tag: Option<String>,
    pub sealed: Option<bool>,
}

impl EvidenceFilter {
    fn matches(&self, item: &EvidenceItem) -> bool {
        self.investigation_id
            .as_ref()
            .map_or(true, |id| item.investigation_id.as_ref() == Some(id))
            && self
                .case_id
                .as_ref()
                .map_or(true, |id| item.case_id.as_ref() == Some(id))
            && self.evidence_type.map_or(true, |t| item.evidence_type == t)
            && self.tag.as_ref().map_or(true, |t| item.tags.contains(t))
            && self.sealed.map_or(true, |s| item.sealed == s)
    }
}

/// Outcome of `verify`. A mismatch is reported here, never as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub expected_hash: String,
    pub actual_hash: String,
    pub evidence: EvidenceRecord,
}

/// An export document together with its rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rendered<T> {
    pub format: ExportFormat,
    pub document: T,
    pub content: String,
}

/// A filtered audit log export (JSONL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    pub exported_at: Timestamp,
    pub exported_by: String,
    pub filter: AuditFilter,
    pub entry_count: usize,
    pub chain: ChainVerification,
    pub content: String,
}

/// Ledger-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub investigations: u64,
    pub active_investigations: u64,
    pub completed_investigations: u64,
    pub evidence: u64,
    pub sealed_evidence: u64,
    pub evidence_by_type: BTreeMap<String, u64>,
    pub total_payload_bytes: u64,
    pub packages: u64,
    pub sealed_packages: u64,
    pub verifications: u64,
    pub verification_failures: u64,
    pub audit_entries: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    investigations: BTreeMap<String, Investigation>,
    evidence: BTreeMap<String, EvidenceItem>,
    packages: BTreeMap<String, EvidencePackage>,
    audit: AuditLog,
    active_package: Option<String>,
}

impl LedgerState {
    fn investigation(&self, id: &str) -> Result<&Investigation> {
        self.investigations
            .get(id)
            .ok_or_else(|| Error::not_found(EntityKind::Investigation, id))
    }

    fn investigation_mut(&mut self, id: &str) -> Result<&mut Investigation> {
        self.investigations
            .get_mut(id)
            .ok_or_else(|| Error::not_found(EntityKind::Investigation, id))
    }

    fn evidence(&self, id: &str) -> Result<&EvidenceItem> {
        self.evidence
            .get(id)
            .ok_or_else(|| Error::not_found(EntityKind::Evidence, id))
    }

    fn evidence_mut(&mut self, id: &str) -> Result<&mut EvidenceItem> {
        self.evidence
            .get_mut(id)
            .ok_or_else(|| Error::not_found(EntityKind::Evidence, id))
    }

    fn package(&self, id: &str) -> Result<&EvidencePackage> {
        self.packages
            .get(id)
            .ok_or_else(|| Error::not_found(EntityKind::Package, id))
    }

    fn package_mut(&mut self, id: &str) -> Result<&mut EvidencePackage> {
        self.packages
            .get_mut(id)
            .ok_or_else(|| Error::not_found(EntityKind::Package, id))
    }

    /// Case id to use for a new item or package scoped to `investigation_id`.
    fn scope(
        &self,
        investigation_id: Option<&str>,
        case_id: Option<String>,
    ) -> Result<Option<String>> {
        match investigation_id {
            Some(id) => {
                let investigation = self.investigation(id)?;
                investigation.ensure_active()?;
                Ok(case_id.or_else(|| investigation.case_id.clone()))
            }
            None => Ok(case_id),
        }
    }

    fn member_states(&self, package: &EvidencePackage) -> Result<Vec<MemberState>> {
        package
            .members
            .iter()
            .map(|id| {
                self.evidence(id).map(|item| MemberState {
                    evidence_id: id.clone(),
                    content_hash: item.content_hash.clone(),
                    intact: item.is_intact(),
                })
            })
            .collect()
    }

    fn bump(&mut self, investigation_id: Option<&str>, update: impl FnOnce(&mut InvestigationStats)) {
        if let Some(investigation) = investigation_id.and_then(|id| self.investigations.get_mut(id)) {
            update(&mut investigation.stats);
        }
    }
}

fn verification_record(item: &EvidenceItem, verified: bool, actor: &str) -> AuditRecord {
    let action = if verified {
        AuditAction::EvidenceVerified
    } else {
        AuditAction::EvidenceVerificationFailed
    };
    AuditRecord::new(action, actor)
        .investigation(item.investigation_id.as_deref())
        .evidence(&item.id)
        .detail(json!({
            "verified": verified,
            "expected_hash": item.content_hash,
            "actual_hash": item.compute_hash(),
        }))
}

fn seal_record(item: &EvidenceItem, actor: &str) -> AuditRecord {
    AuditRecord::new(AuditAction::EvidenceSealed, actor)
        .investigation(item.investigation_id.as_deref())
        .evidence(&item.id)
        .detail(json!({ "content_hash": item.content_hash }))
}

/// Façade coordinating investigations, evidence, packages and the audit log.
pub struct EvidenceManager {
    config: LedgerConfig,
    ids: IdGenerator,
    state: RwLock<LedgerState>,
    notifier: Notifier,
}

impl EvidenceManager {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let notifier = Notifier::new(config.notification_capacity);
        Ok(Self {
            config,
            ids: IdGenerator::new(),
            state: RwLock::new(LedgerState::default()),
            notifier,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Receive every committed change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.notifier.subscribe()
    }

    fn actor(&self, actor: Option<&str>) -> String {
        match actor.map(str::trim) {
            Some(a) if !a.is_empty() => a.to_string(),
            _ => self.config.system_actor.clone(),
        }
    }

    fn ensure_format(&self, format: ExportFormat) -> Result<()> {
        if self.config.supports(format) {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "export format {} is not enabled",
                format
            )))
        }
    }

    // ----- investigations -------------------------------------------------

    pub fn create_investigation(&self, request: NewInvestigation) -> Result<Investigation> {
        let actor = self.actor(request.investigator.as_deref());
        let id = self.ids.next(INVESTIGATION_PREFIX);
        let investigation = Investigation::new(
            id.clone(),
            request.name,
            request.description,
            request.investigator,
            request.case_id,
            request.metadata,
        )?;

        let entry = {
            let mut state = self.state.write();
            state
                .investigations
                .insert(id.clone(), investigation.clone());
            state
                .audit
                .record(
                    AuditRecord::new(AuditAction::InvestigationCreated, actor)
                        .investigation(Some(id.as_str()))
                        .detail(json!({
                            "name": investigation.name,
                            "case_id": investigation.case_id,
                        })),
                )
                .clone()
        };

        info!(investigation_id = %id, name = %investigation.name, "Investigation created");
        self.notifier.publish(&[entry]);
        Ok(investigation)
    }

    pub fn complete_investigation(&self, id: &str, actor: Option<&str>) -> Result<Investigation> {
        let actor = self.actor(actor);
        let (investigation, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let investigation = state.investigation_mut(id)?;
            let completed_at = investigation.complete()?;
            let investigation = investigation.clone();
            let entry = state
                .audit
                .record(
                    AuditRecord::new(AuditAction::InvestigationCompleted, actor)
                        .investigation(Some(id))
                        .detail(json!({
                            "completed_at": completed_at,
                            "stats": investigation.stats,
                        })),
                )
                .clone();
            (investigation, entry)
        };

        info!(investigation_id = %id, "Investigation completed");
        self.notifier.publish(&[entry]);
        Ok(investigation)
    }

    pub fn get_investigation(&self, id: &str) -> Result<Investigation> {
        self.state.read().investigation(id).cloned()
    }

    pub fn list_investigations(&self) -> Vec<Investigation> {
        self.state.read().investigations.values().cloned().collect()
    }

    pub fn investigation_stats(&self, id: &str) -> Result<InvestigationStats> {
        Ok(self.state.read().investigation(id)?.stats.clone())
    }

    // ----- evidence -------------------------------------------------------

    /// Capture a new evidence item.
    pub fn collect(
        &self,
        evidence_type: EvidenceType,
        payload: Payload,
        options: CollectOptions,
    ) -> Result<EvidenceRecord> {
        let actor = self.actor(options.actor.as_deref());
        let mut guard = self.state.write();
        let state = &mut *guard;

        let case_id = state.scope(options.investigation_id.as_deref(), options.case_id)?;
        let id = self.ids.next(EVIDENCE_PREFIX);
        let mut item = EvidenceItem::collect(
            id.clone(),
            evidence_type,
            payload,
            self.config.hash_algorithm,
            options.metadata,
            options.tags,
            actor.clone(),
            case_id,
            options.investigation_id,
        )?;

        let verified = self
            .config
            .auto_verify_on_capture
            .then(|| item.record_verification(&actor));
        if self.config.auto_seal_on_capture {
            item.seal(&actor)?;
        }

        let investigation_id = item.investigation_id.clone();
        let mut entries = vec![state
            .audit
            .record(
                AuditRecord::new(AuditAction::EvidenceCollected, &actor)
                    .investigation(investigation_id.as_deref())
                    .evidence(&id)
                    .detail(json!({
                        "evidence_type": item.evidence_type,
                        "content_hash": item.content_hash,
                        "hash_algorithm": item.hash_algorithm,
                        "size_bytes": item.size_bytes,
                    })),
            )
            .clone()];
        if let Some(verified) = verified {
            entries.push(
                state
                    .audit
                    .record(verification_record(&item, verified, &actor))
                    .clone(),
            );
        }
        if item.sealed {
            entries.push(state.audit.record(seal_record(&item, &actor)).clone());
        }

        let sealed = item.sealed;
        state.bump(investigation_id.as_deref(), |stats| {
            stats.evidence_collected += 1;
            if let Some(verified) = verified {
                stats.verifications += 1;
                if !verified {
                    stats.verification_failures += 1;
                }
            }
            if sealed {
                stats.evidence_sealed += 1;
            }
        });

        let record = EvidenceRecord::from_item(&item, false);
        state.evidence.insert(id.clone(), item);
        drop(guard);

        info!(
            evidence_id = %id,
            evidence_type = %evidence_type,
            content_hash = %record.content_hash,
            actor = %actor,
            "Evidence collected"
        );
        self.notifier.publish(&entries);
        Ok(record)
    }

    /// Recompute an item's digest and record the outcome.
    pub fn verify(&self, evidence_id: &str, actor: Option<&str>) -> Result<VerificationOutcome> {
        let actor = self.actor(actor);
        let (outcome, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let item = state.evidence_mut(evidence_id)?;
            let verified = item.record_verification(&actor);
            let outcome = VerificationOutcome {
                verified,
                expected_hash: item.content_hash.clone(),
                actual_hash: item.compute_hash(),
                evidence: EvidenceRecord::from_item(item, false),
            };
            let record = verification_record(item, verified, &actor);
            let investigation_id = item.investigation_id.clone();

            let entry = state.audit.record(record).clone();
            state.bump(investigation_id.as_deref(), |stats| {
                stats.verifications += 1;
                if !verified {
                    stats.verification_failures += 1;
                }
            });
            (outcome, entry)
        };

        if outcome.verified {
            info!(evidence_id = %evidence_id, actor = %actor, "Evidence verified");
        } else {
            warn!(
                evidence_id = %evidence_id,
                expected = %outcome.expected_hash,
                actual = %outcome.actual_hash,
                "Evidence verification failed: content hash mismatch"
            );
        }
        self.notifier.publish(&[entry]);
        Ok(outcome)
    }

    /// Make an item permanently read-only.
    pub fn seal(&self, evidence_id: &str, actor: Option<&str>) -> Result<EvidenceRecord> {
        let actor = self.actor(actor);
        let (record, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let item = state.evidence_mut(evidence_id)?;
            item.seal(&actor)?;
            let record = EvidenceRecord::from_item(item, false);
            let audit = seal_record(item, &actor);
            let investigation_id = item.investigation_id.clone();

            let entry = state.audit.record(audit).clone();
            state.bump(investigation_id.as_deref(), |stats| stats.evidence_sealed += 1);
            (record, entry)
        };

        info!(evidence_id = %evidence_id, actor = %actor, "Evidence sealed");
        self.notifier.publish(&[entry]);
        Ok(record)
    }

    pub fn add_tags(
        &self,
        evidence_id: &str,
        tags: Vec<String>,
        actor: Option<&str>,
    ) -> Result<EvidenceRecord> {
        let actor = self.actor(actor);
        if tags.iter().all(|t| t.trim().is_empty()) {
            return Err(Error::InvalidArgument("at least one tag is required".into()));
        }

        let (record, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let item = state.evidence_mut(evidence_id)?;
            let added = item.add_tags(tags.clone())?;
            let record = EvidenceRecord::from_item(item, false);
            let audit = AuditRecord::new(AuditAction::EvidenceTagged, &actor)
                .investigation(item.investigation_id.as_deref())
                .evidence(evidence_id)
                .detail(json!({ "tags": tags, "added": added }));
            (record, state.audit.record(audit).clone())
        };

        debug!(evidence_id = %evidence_id, "Evidence tagged");
        self.notifier.publish(&[entry]);
        Ok(record)
    }

    pub fn update_metadata(
        &self,
        evidence_id: &str,
        metadata: EvidenceMetadata,
        actor: Option<&str>,
    ) -> Result<EvidenceRecord> {
        let actor = self.actor(actor);
        let (record, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let item = state.evidence_mut(evidence_id)?;
            let previous = item.metadata.clone();
            item.update_metadata(metadata)?;
            let record = EvidenceRecord::from_item(item, false);
            let audit = AuditRecord::new(AuditAction::EvidenceMetadataUpdated, &actor)
                .investigation(item.investigation_id.as_deref())
                .evidence(evidence_id)
                .detail(json!({ "previous": previous, "current": item.metadata }));
            (record, state.audit.record(audit).clone())
        };

        debug!(evidence_id = %evidence_id, "Evidence metadata updated");
        self.notifier.publish(&[entry]);
        Ok(record)
    }

    /// Read the raw payload; the read itself becomes part of the custody chain.
    pub fn access_evidence(&self, evidence_id: &str, actor: Option<&str>) -> Result<Payload> {
        let actor = self.actor(actor);
        let (payload, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let item = state.evidence_mut(evidence_id)?;
            item.record_access(&actor);
            let payload = item.payload.clone();
            let audit = AuditRecord::new(AuditAction::EvidenceAccessed, &actor)
                .investigation(item.investigation_id.as_deref())
                .evidence(evidence_id);
            (payload, state.audit.record(audit).clone())
        };

        info!(evidence_id = %evidence_id, actor = %actor, "Evidence payload accessed");
        self.notifier.publish(&[entry]);
        Ok(payload)
    }

    pub fn get_evidence(&self, evidence_id: &str) -> Result<EvidenceRecord> {
        let state = self.state.read();
        Ok(EvidenceRecord::from_item(state.evidence(evidence_id)?, false))
    }

    pub fn list_evidence(&self, filter: &EvidenceFilter) -> Vec<EvidenceRecord> {
        self.state
            .read()
            .evidence
            .values()
            .filter(|item| filter.matches(item))
            .map(|item| EvidenceRecord::from_item(item, false))
            .collect()
    }

    pub fn export_evidence(
        &self,
        evidence_id: &str,
        options: ExportOptions,
    ) -> Result<Rendered<EvidenceExport>> {
        self.ensure_format(options.format)?;
        let actor = self.actor(options.actor.as_deref());
        let include_payload = options
            .include_payload
            .unwrap_or(self.config.include_payload_by_default);

        let (document, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let item = state.evidence_mut(evidence_id)?;
            item.record_export(&actor, json!({ "format": options.format }));
            let integrity_verified = item.is_intact();
            let evidence = EvidenceRecord::from_item(item, include_payload);
            let audit = AuditRecord::new(AuditAction::EvidenceExported, &actor)
                .investigation(item.investigation_id.as_deref())
                .evidence(evidence_id)
                .detail(json!({
                    "format": options.format,
                    "include_payload": include_payload,
                }));

            let entry = state.audit.record(audit).clone();
            let audit_trail = state.audit.query(&AuditFilter {
                evidence_id: Some(evidence_id.to_string()),
                ..Default::default()
            });
            let document = EvidenceExport {
                schema_version: EXPORT_SCHEMA_VERSION.to_string(),
                exported_at: entry.timestamp,
                exported_by: actor.clone(),
                evidence,
                integrity_verified,
                audit_trail,
                includes_payload: include_payload,
            };
            (document, entry)
        };

        let content = export::render_evidence(&document, options.format)?;
        info!(evidence_id = %evidence_id, format = %options.format, "Evidence exported");
        self.notifier.publish(&[entry]);
        Ok(Rendered {
            format: options.format,
            document,
            content,
        })
    }

    // ----- packages -------------------------------------------------------

    /// Create a package; it becomes the active package.
    pub fn create_package(&self, request: NewPackage) -> Result<EvidencePackage> {
        let actor = self.actor(request.actor.as_deref());
        let (package, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let case_id = state.scope(request.investigation_id.as_deref(), request.case_id)?;
            let id = self.ids.next(PACKAGE_PREFIX);
            let package = EvidencePackage::new(
                id.clone(),
                request.name,
                request.description,
                case_id,
                request.investigation_id,
                actor.clone(),
                request.tags,
                self.config.hash_algorithm,
            )?;

            let entry = state
                .audit
                .record(
                    AuditRecord::new(AuditAction::PackageCreated, &actor)
                        .investigation(package.investigation_id.as_deref())
                        .package(&id)
                        .detail(json!({ "name": package.name, "case_id": package.case_id })),
                )
                .clone();
            state.bump(package.investigation_id.as_deref(), |stats| {
                stats.packages_created += 1
            });
            state.packages.insert(id.clone(), package.clone());
            state.active_package = Some(id);
            (package, entry)
        };

        info!(package_id = %package.id, name = %package.name, "Evidence package created");
        self.notifier.publish(&[entry]);
        Ok(package)
    }

    /// Make an existing package the target of package commands that name none.
    pub fn set_active_package(
        &self,
        package_id: &str,
        actor: Option<&str>,
    ) -> Result<EvidencePackage> {
        let actor = self.actor(actor);
        let (package, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let package = state.package(package_id)?.clone();
            let previous = state.active_package.replace(package.id.clone());
            let entry = state
                .audit
                .record(
                    AuditRecord::new(AuditAction::PackageActivated, &actor)
                        .investigation(package.investigation_id.as_deref())
                        .package(package_id)
                        .detail(json!({ "previous": previous })),
                )
                .clone();
            (package, entry)
        };

        debug!(package_id = %package_id, "Active package changed");
        self.notifier.publish(&[entry]);
        Ok(package)
    }

    pub fn active_package(&self) -> Option<String> {
        self.state.read().active_package.clone()
    }

    /// The given package id, or the active package when none is given.
    pub fn resolve_package(&self, package_id: Option<&str>) -> Result<String> {
        match package_id {
            Some(id) => Ok(id.to_string()),
            None => self.active_package().ok_or_else(|| {
                Error::NotInitialized(
                    "no evidence package is active; create a package first".into(),
                )
            }),
        }
    }

    pub fn add_to_package(
        &self,
        package_id: &str,
        evidence_id: &str,
        actor: Option<&str>,
    ) -> Result<EvidencePackage> {
        let actor = self.actor(actor);
        let (package, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            state.package(package_id)?;
            state.evidence(evidence_id)?;

            let package = state.package_mut(package_id)?;
            let position = package.add_member(evidence_id)?;
            let package = package.clone();
            let entry = state
                .audit
                .record(
                    AuditRecord::new(AuditAction::EvidenceAddedToPackage, &actor)
                        .investigation(package.investigation_id.as_deref())
                        .package(package_id)
                        .evidence(evidence_id)
                        .detail(json!({ "position": position })),
                )
                .clone();
            (package, entry)
        };

        debug!(package_id = %package_id, evidence_id = %evidence_id, "Evidence added to package");
        self.notifier.publish(&[entry]);
        Ok(package)
    }

    pub fn annotate_package(
        &self,
        package_id: &str,
        annotation: NewAnnotation,
    ) -> Result<EvidencePackage> {
        let (package, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let package = state.package_mut(package_id)?;
            package.annotate(
                annotation.author.clone(),
                annotation.text.clone(),
                annotation.evidence_ids.clone(),
            )?;
            let package = package.clone();
            let entry = state
                .audit
                .record(
                    AuditRecord::new(AuditAction::PackageAnnotated, annotation.author)
                        .investigation(package.investigation_id.as_deref())
                        .package(package_id)
                        .detail(json!({
                            "text": annotation.text,
                            "evidence_ids": annotation.evidence_ids,
                        })),
                )
                .clone();
            (package, entry)
        };

        debug!(package_id = %package_id, "Package annotated");
        self.notifier.publish(&[entry]);
        Ok(package)
    }

    /// Lock membership and compute the package hash.
    pub fn seal_package(&self, package_id: &str, actor: Option<&str>) -> Result<EvidencePackage> {
        let actor = self.actor(actor);
        let (package, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let current = state.package(package_id)?;
            if current.sealed {
                return Err(Error::already_sealed(EntityKind::Package, package_id));
            }
            let member_hashes: Vec<String> = state
                .member_states(current)?
                .into_iter()
                .map(|m| m.content_hash)
                .collect();

            let package = state.package_mut(package_id)?;
            let package_hash = package.seal(&actor, member_hashes)?;
            let package = package.clone();
            let entry = state
                .audit
                .record(
                    AuditRecord::new(AuditAction::PackageSealed, &actor)
                        .investigation(package.investigation_id.as_deref())
                        .package(package_id)
                        .detail(json!({
                            "package_hash": package_hash,
                            "hash_algorithm": package.hash_algorithm,
                            "members": package.members,
                        })),
                )
                .clone();
            state.bump(package.investigation_id.as_deref(), |stats| {
                stats.packages_sealed += 1
            });
            (package, entry)
        };

        info!(
            package_id = %package_id,
            package_hash = package.package_hash.as_deref().unwrap_or_default(),
            members = package.members.len(),
            "Evidence package sealed"
        );
        self.notifier.publish(&[entry]);
        Ok(package)
    }

    /// Recompute a sealed package's hash from its members' current hashes.
    pub fn verify_package(
        &self,
        package_id: &str,
        actor: Option<&str>,
    ) -> Result<PackageVerification> {
        let actor = self.actor(actor);
        let (verification, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let package = state.package(package_id)?;
            let verification = package.verify(&state.member_states(package)?)?;
            let investigation_id = package.investigation_id.clone();
            let entry = state
                .audit
                .record(
                    AuditRecord::new(AuditAction::PackageVerified, &actor)
                        .investigation(investigation_id.as_deref())
                        .package(package_id)
                        .detail(json!({
                            "valid": verification.valid,
                            "expected_hash": verification.expected_hash,
                            "actual_hash": verification.actual_hash,
                            "divergent_members": verification.divergent_members,
                            "tampered_members": verification.tampered_members,
                        })),
                )
                .clone();
            (verification, entry)
        };

        if verification.is_fully_intact() {
            info!(package_id = %package_id, "Evidence package verified");
        } else {
            warn!(
                package_id = %package_id,
                valid = verification.valid,
                divergent = verification.divergent_members.len(),
                tampered = verification.tampered_members.len(),
                "Evidence package integrity check failed"
            );
        }
        self.notifier.publish(&[entry]);
        Ok(verification)
    }

    pub fn get_package(&self, package_id: &str) -> Result<EvidencePackage> {
        self.state.read().package(package_id).cloned()
    }

    pub fn list_packages(&self) -> Vec<EvidencePackage> {
        self.state.read().packages.values().cloned().collect()
    }

    /// Render a self-contained report of a package.
    ///
    /// Every member records an `exported` custody event before the document
    /// is assembled, so the export reflects the ledger including itself.
    pub fn export_package(
        &self,
        package_id: &str,
        options: ExportOptions,
    ) -> Result<Rendered<PackageExport>> {
        self.ensure_format(options.format)?;
        let actor = self.actor(options.actor.as_deref());
        let include_payload = options
            .include_payload
            .unwrap_or(self.config.include_payload_by_default);

        let (document, entry) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let package = state.package(package_id)?.clone();

            let distinct: Vec<String> = {
                let mut seen = HashSet::new();
                package
                    .members
                    .iter()
                    .filter(|id| seen.insert(id.as_str()))
                    .cloned()
                    .collect()
            };
            for id in &distinct {
                state.evidence(id)?;
            }
            let verification = if package.sealed {
                Some(package.verify(&state.member_states(&package)?)?)
            } else {
                None
            };

            for id in &distinct {
                if let Some(item) = state.evidence.get_mut(id) {
                    item.record_export(
                        &actor,
                        json!({ "package_id": package_id, "format": options.format }),
                    );
                }
            }
            let entry = state
                .audit
                .record(
                    AuditRecord::new(AuditAction::PackageExported, &actor)
                        .investigation(package.investigation_id.as_deref())
                        .package(package_id)
                        .detail(json!({
                            "format": options.format,
                            "include_payload": include_payload,
                            "package_hash": package.package_hash,
                            "members": distinct,
                        })),
                )
                .clone();

            let evidence: Vec<EvidenceRecord> = distinct
                .iter()
                .filter_map(|id| state.evidence.get(id))
                .map(|item| EvidenceRecord::from_item(item, include_payload))
                .collect();
            let member_set: HashSet<&str> = distinct.iter().map(String::as_str).collect();
            let audit_trail: Vec<AuditEntry> = state
                .audit
                .entries()
                .iter()
                .filter(|e| {
                    e.package_id.as_deref() == Some(package_id)
                        || e
                            .evidence_id
                            .as_deref()
                            .map_or(false, |id| member_set.contains(id))
                })
                .cloned()
                .collect();

            let integrity_verified = verification
                .as_ref()
                .map_or(false, PackageVerification::is_fully_intact);
            let certification =
                Certification::for_package(&package, &actor, entry.timestamp, integrity_verified);
            let document = PackageExport {
                schema_version: EXPORT_SCHEMA_VERSION.to_string(),
                exported_at: entry.timestamp,
                exported_by: actor.clone(),
                package,
                evidence,
                verification,
                audit_trail,
                audit_chain: state.audit.verify_chain(),
                certification,
                includes_payload: include_payload,
            };
            (document, entry)
        };

        let content = export::render_package(&document, options.format)?;
        info!(
            package_id = %package_id,
            format = %options.format,
            members = document.evidence.len(),
            "Evidence package exported"
        );
        self.notifier.publish(&[entry]);
        Ok(Rendered {
            format: options.format,
            document,
            content,
        })
    }

    // ----- audit & statistics ---------------------------------------------

    /// Audit entries matching `filter`, in chronological order.
    pub fn audit_log(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.state.read().audit.query(filter)
    }

    pub fn audit_len(&self) -> usize {
        self.state.read().audit.len()
    }

    /// Render matching entries as JSONL, then record the export itself.
    pub fn export_audit(&self, filter: &AuditFilter, actor: Option<&str>) -> Result<AuditExport> {
        let actor = self.actor(actor);
        let (export, entry) = {
            let mut state = self.state.write();
            let entries = state.audit.query(filter);
            let chain = verify_entries(&entries);
            let content = AuditLog::to_jsonl(&entries);
            let entry = state
                .audit
                .record(
                    AuditRecord::new(AuditAction::AuditExported, &actor)
                        .investigation(filter.investigation_id.as_deref())
                        .detail(json!({
                            "filter": filter,
                            "entries": entries.len(),
                            "head_hash": chain.head_hash,
                        })),
                )
                .clone();
            let export = AuditExport {
                exported_at: entry.timestamp,
                exported_by: actor.clone(),
                filter: filter.clone(),
                entry_count: entries.len(),
                chain,
                content,
            };
            (export, entry)
        };

        info!(entries = export.entry_count, actor = %actor, "Audit log exported");
        self.notifier.publish(&[entry]);
        Ok(export)
    }

    pub fn verify_audit_chain(&self) -> ChainVerification {
        self.state.read().audit.verify_chain()
    }

    pub fn statistics(&self) -> LedgerStats {
        let state = self.state.read();
        let mut stats = LedgerStats {
            investigations: state.investigations.len() as u64,
            packages: state.packages.len() as u64,
            audit_entries: state.audit.len() as u64,
            ..Default::default()
        };

        for investigation in state.investigations.values() {
            match investigation.status {
                InvestigationStatus::Active => stats.active_investigations += 1,
                InvestigationStatus::Completed => stats.completed_investigations += 1,
            }
        }
        for item in state.evidence.values() {
            stats.evidence += 1;
            stats.total_payload_bytes += item.size_bytes;
            if item.sealed {
                stats.sealed_evidence += 1;
            }
            *stats
                .evidence_by_type
                .entry(item.evidence_type.to_string())
                .or_insert(0) += 1;
            let failures = item
                .custody
                .count(custodian_schema::CustodyAction::VerificationFailed)
                as u64;
            stats.verification_failures += failures;
            stats.verifications +=
                item.custody.count(custodian_schema::CustodyAction::Verified) as u64 + failures;
        }
        stats.sealed_packages = state.packages.values().filter(|p| p.sealed).count() as u64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_common::hash::sha256_str;
    use custodian_common::HashAlgorithm;
    use custodian_schema::{check_export_integrity, validate_package_export, CustodyAction};
    use pretty_assertions::assert_eq;

    fn manager() -> EvidenceManager {
        EvidenceManager::new(LedgerConfig::default()).unwrap()
    }

    fn screenshot(manager: &EvidenceManager, investigation_id: Option<&str>) -> EvidenceRecord {
        manager
            .collect(
                EvidenceType::Screenshot,
                Payload::Binary(b"<png-bytes>".to_vec()),
                CollectOptions {
                    actor: Some("investigator".into()),
                    investigation_id: investigation_id.map(str::to_string),
                    ..Default::default()
                },
            )
            .unwrap()
    }

    fn text(manager: &EvidenceManager, body: &str) -> EvidenceRecord {
        manager
            .collect(EvidenceType::DomSnapshot, Payload::from(body), CollectOptions::default())
            .unwrap()
    }

    /// Simulate out-of-band corruption of stored content.
    fn tamper(manager: &EvidenceManager, evidence_id: &str, payload: Payload) {
        manager
            .state
            .write()
            .evidence
            .get_mut(evidence_id)
            .unwrap()
            .payload = payload;
    }

    #[test]
    fn test_case_walkthrough_audit_sequence() {
        let manager = manager();
        let inv = manager
            .create_investigation(NewInvestigation::named("Case-001"))
            .unwrap();

        let ev = screenshot(&manager, Some(inv.id.as_str()));
        assert_eq!(ev.content_hash.len(), 64);
        assert!(ev.content_hash.chars().all(|c| c.is_ascii_hexdigit()));

        assert!(manager.verify(&ev.id, None).unwrap().verified);

        let sealed = manager.seal(&ev.id, Some("investigator")).unwrap();
        assert!(sealed.sealed);
        assert!(sealed.sealed_at.is_some());

        let err = manager
            .add_tags(&ev.id, vec!["late".into()], None)
            .unwrap_err();
        assert_eq!(err.kind(), "already_sealed");

        let pkg = manager
            .create_package(NewPackage {
                name: "Case-001 captures".into(),
                investigation_id: Some(inv.id.clone()),
                ..Default::default()
            })
            .unwrap();
        manager.add_to_package(&pkg.id, &ev.id, None).unwrap();
        let sealed_pkg = manager.seal_package(&pkg.id, Some("investigator")).unwrap();
        assert_eq!(
            sealed_pkg.package_hash.as_deref(),
            Some(sha256_str(&ev.content_hash).as_str())
        );

        let actions: Vec<AuditAction> = manager
            .audit_log(&AuditFilter {
                investigation_id: Some(inv.id.clone()),
                ..Default::default()
            })
            .iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::InvestigationCreated,
                AuditAction::EvidenceCollected,
                AuditAction::EvidenceVerified,
                AuditAction::EvidenceSealed,
                AuditAction::PackageCreated,
                AuditAction::EvidenceAddedToPackage,
                AuditAction::PackageSealed,
            ]
        );

        let stats = manager.investigation_stats(&inv.id).unwrap();
        assert_eq!(stats.evidence_collected, 1);
        assert_eq!(stats.evidence_sealed, 1);
        assert_eq!(stats.packages_created, 1);
        assert_eq!(stats.packages_sealed, 1);
        assert_eq!(stats.verifications, 1);
    }

    #[test]
    fn test_tamper_detection_is_reported_not_raised() {
        let manager = manager();
        let inv = manager
            .create_investigation(NewInvestigation::named("Case-002"))
            .unwrap();
        let ev = screenshot(&manager, Some(inv.id.as_str()));

        tamper(&manager, &ev.id, Payload::Binary(b"<edited>".to_vec()));

        let outcome = manager.verify(&ev.id, Some("auditor")).unwrap();
        assert!(!outcome.verified);
        assert_ne!(outcome.actual_hash, outcome.expected_hash);
        assert_eq!(
            outcome
                .evidence
                .custody_chain
                .iter()
                .filter(|e| e.action == CustodyAction::VerificationFailed)
                .count(),
            1
        );

        let failures = manager.audit_log(&AuditFilter {
            action: Some(AuditAction::EvidenceVerificationFailed),
            ..Default::default()
        });
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].evidence_id.as_deref(), Some(ev.id.as_str()));
        assert_eq!(manager.investigation_stats(&inv.id).unwrap().verification_failures, 1);
        assert_eq!(manager.statistics().verification_failures, 1);
    }

    #[test]
    fn test_seal_blocks_mutation_without_side_effects() {
        let manager = manager();
        let ev = screenshot(&manager, None);
        manager.seal(&ev.id, None).unwrap();

        let audit_before = manager.audit_len();
        let custody_before = manager.get_evidence(&ev.id).unwrap().custody_chain.len();

        assert_eq!(
            manager.seal(&ev.id, None).unwrap_err().kind(),
            "already_sealed"
        );
        assert_eq!(
            manager
                .add_tags(&ev.id, vec!["x".into()], None)
                .unwrap_err()
                .kind(),
            "already_sealed"
        );
        assert_eq!(
            manager
                .update_metadata(&ev.id, EvidenceMetadata::default(), None)
                .unwrap_err()
                .kind(),
            "immutable"
        );

        assert_eq!(manager.audit_len(), audit_before);
        assert_eq!(
            manager.get_evidence(&ev.id).unwrap().custody_chain.len(),
            custody_before
        );

        // Verification still appends to a sealed item's custody chain.
        assert!(manager.verify(&ev.id, None).unwrap().verified);
    }

    #[test]
    fn test_package_hash_composition_and_order() {
        let manager = manager();
        let e1 = text(&manager, "one");
        let e2 = text(&manager, "two");
        let e3 = text(&manager, "three");

        let forward = manager.create_package(NewPackage::named("forward")).unwrap();
        for e in [&e1, &e2, &e3] {
            manager.add_to_package(&forward.id, &e.id, None).unwrap();
        }
        let forward = manager.seal_package(&forward.id, None).unwrap();
        let expected = sha256_str(&format!(
            "{}{}{}",
            e1.content_hash, e2.content_hash, e3.content_hash
        ));
        assert_eq!(forward.package_hash.as_deref(), Some(expected.as_str()));

        let reversed = manager.create_package(NewPackage::named("reversed")).unwrap();
        for e in [&e3, &e2, &e1] {
            manager.add_to_package(&reversed.id, &e.id, None).unwrap();
        }
        let reversed = manager.seal_package(&reversed.id, None).unwrap();
        assert_ne!(reversed.package_hash, forward.package_hash);
    }

    #[test]
    fn test_add_to_package_rules() {
        let manager = manager();
        let ev = screenshot(&manager, None);
        manager.seal(&ev.id, None).unwrap();
        let pkg = manager.create_package(NewPackage::named("bundle")).unwrap();

        assert_eq!(
            manager
                .add_to_package("pkg-missing", &ev.id, None)
                .unwrap_err()
                .kind(),
            "not_found"
        );
        assert_eq!(
            manager
                .add_to_package(&pkg.id, "ev-missing", None)
                .unwrap_err()
                .kind(),
            "not_found"
        );

        // Sealed evidence can be bundled, and repeated membership is kept.
        manager.add_to_package(&pkg.id, &ev.id, None).unwrap();
        let pkg = manager.add_to_package(&pkg.id, &ev.id, None).unwrap();
        assert_eq!(pkg.members, vec![ev.id.clone(), ev.id.clone()]);

        manager.seal_package(&pkg.id, None).unwrap();
        assert_eq!(
            manager
                .add_to_package(&pkg.id, &ev.id, None)
                .unwrap_err()
                .kind(),
            "already_sealed"
        );
        assert_eq!(
            manager
                .annotate_package(
                    &pkg.id,
                    NewAnnotation {
                        author: "analyst".into(),
                        text: "too late".into(),
                        evidence_ids: vec![],
                    }
                )
                .unwrap_err()
                .kind(),
            "immutable"
        );
        assert_eq!(
            manager.seal_package(&pkg.id, None).unwrap_err().kind(),
            "already_sealed"
        );
    }

    #[test]
    fn test_verify_package_reports_divergent_members() {
        let manager = manager();
        let e1 = text(&manager, "alpha");
        let e2 = text(&manager, "beta");
        let pkg = manager.create_package(NewPackage::named("pair")).unwrap();
        manager.add_to_package(&pkg.id, &e1.id, None).unwrap();
        manager.add_to_package(&pkg.id, &e2.id, None).unwrap();
        manager.seal_package(&pkg.id, None).unwrap();

        assert!(manager.verify_package(&pkg.id, None).unwrap().is_fully_intact());

        // Payload tampering leaves the package hash intact but is flagged.
        tamper(&manager, &e2.id, Payload::from("gamma"));
        let check = manager.verify_package(&pkg.id, None).unwrap();
        assert!(check.valid);
        assert_eq!(check.tampered_members, vec![e2.id.clone()]);

        // Rewriting a stored content hash breaks the package hash.
        manager
            .state
            .write()
            .evidence
            .get_mut(&e1.id)
            .unwrap()
            .content_hash = sha256_str("forged");
        let check = manager.verify_package(&pkg.id, None).unwrap();
        assert!(!check.valid);
        assert_eq!(check.divergent_members, vec![e1.id.clone()]);
    }

    #[test]
    fn test_audit_log_only_grows() {
        let manager = manager();
        let mut last = manager.audit_len();
        let mut step = |expected_growth: usize| {
            let now = manager.audit_len();
            assert_eq!(now, last + expected_growth);
            last = now;
        };

        let inv = manager
            .create_investigation(NewInvestigation::named("growth"))
            .unwrap();
        step(1);
        let ev = screenshot(&manager, Some(inv.id.as_str()));
        step(1);
        let _ = manager.collect(
            EvidenceType::ConsoleLog,
            Payload::Text(String::new()),
            CollectOptions::default(),
        );
        step(0);
        manager.verify(&ev.id, None).unwrap();
        step(1);
        let _ = manager.verify("ev-missing", None);
        step(0);
        manager.complete_investigation(&inv.id, None).unwrap();
        step(1);
        let _ = manager.complete_investigation(&inv.id, None);
        step(0);
        manager.export_audit(&AuditFilter::default(), None).unwrap();
        step(1);

        let entries = manager.audit_log(&AuditFilter::default());
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(manager.verify_audit_chain().valid);
    }

    #[test]
    fn test_export_round_trip_matches_ledger() {
        let manager = manager();
        let inv = manager
            .create_investigation(NewInvestigation {
                name: "Case-003".into(),
                case_id: Some("CASE-003".into()),
                ..Default::default()
            })
            .unwrap();
        let e1 = screenshot(&manager, Some(inv.id.as_str()));
        let e2 = manager
            .collect(
                EvidenceType::CookieSet,
                Payload::Structured(json!([{"name": "sid", "value": "abc"}])),
                CollectOptions {
                    investigation_id: Some(inv.id.clone()),
                    tags: vec!["session".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(e2.case_id.as_deref(), Some("CASE-003"));

        let pkg = manager
            .create_package(NewPackage {
                name: "exhibits".into(),
                investigation_id: Some(inv.id.clone()),
                ..Default::default()
            })
            .unwrap();
        manager.add_to_package(&pkg.id, &e1.id, None).unwrap();
        manager.add_to_package(&pkg.id, &e2.id, None).unwrap();
        manager
            .annotate_package(
                &pkg.id,
                NewAnnotation {
                    author: "analyst".into(),
                    text: "session cookie matches login".into(),
                    evidence_ids: vec![e2.id.clone()],
                },
            )
            .unwrap();
        manager.seal_package(&pkg.id, Some("lead")).unwrap();

        let rendered = manager
            .export_package(
                &pkg.id,
                ExportOptions {
                    actor: Some("clerk".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!rendered.document.includes_payload);
        assert!(rendered.document.certification.integrity_verified);

        let value: serde_json::Value = serde_json::from_str(&rendered.content).unwrap();
        let schema_check = validate_package_export(&value).unwrap();
        assert!(schema_check.valid, "Errors: {:?}", schema_check.errors);

        let parsed: PackageExport = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, rendered.document);
        assert!(check_export_integrity(&parsed).valid);

        let live = manager.get_package(&pkg.id).unwrap();
        assert_eq!(parsed.package.package_hash, live.package_hash);
        for record in &parsed.evidence {
            let live = manager.get_evidence(&record.id).unwrap();
            assert_eq!(record.content_hash, live.content_hash);
            assert_eq!(record.custody_chain, live.custody_chain);
            assert_eq!(
                record.custody_chain.last().map(|e| e.action),
                Some(CustodyAction::Exported)
            );
            assert!(record.payload.is_none());
        }
        assert_eq!(
            parsed.audit_trail.last().map(|e| e.action),
            Some(AuditAction::PackageExported)
        );
    }

    #[test]
    fn test_export_with_payload_and_compliance_format() {
        let manager = manager();
        let ev = screenshot(&manager, None);
        let pkg = manager.create_package(NewPackage::named("court")).unwrap();
        manager.add_to_package(&pkg.id, &ev.id, None).unwrap();
        manager.seal_package(&pkg.id, None).unwrap();

        let json_export = manager
            .export_package(
                &pkg.id,
                ExportOptions {
                    include_payload: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            json_export.document.evidence[0].payload,
            Some(Payload::Binary(b"<png-bytes>".to_vec()))
        );

        let report = manager
            .export_package(
                &pkg.id,
                ExportOptions {
                    format: ExportFormat::Compliance,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(report.content.contains(&ev.content_hash));
        assert!(report.content.contains("Certification"));
    }

    #[test]
    fn test_disabled_export_format_rejected() {
        let manager = EvidenceManager::new(LedgerConfig {
            export_formats: vec![ExportFormat::Json],
            ..Default::default()
        })
        .unwrap();
        let ev = screenshot(&manager, None);
        let before = manager.audit_len();
        let err = manager
            .export_evidence(
                &ev.id,
                ExportOptions {
                    format: ExportFormat::Compliance,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        assert_eq!(manager.audit_len(), before);
    }

    #[test]
    fn test_collect_validation() {
        let manager = manager();
        let err = manager
            .collect(
                EvidenceType::ConsoleLog,
                Payload::Structured(serde_json::Value::Null),
                CollectOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");

        let err = manager
            .collect(
                EvidenceType::ConsoleLog,
                Payload::from("log"),
                CollectOptions {
                    investigation_id: Some("inv-missing".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let inv = manager
            .create_investigation(NewInvestigation::named("closed"))
            .unwrap();
        manager.complete_investigation(&inv.id, None).unwrap();
        let err = manager
            .collect(
                EvidenceType::ConsoleLog,
                Payload::from("log"),
                CollectOptions {
                    investigation_id: Some(inv.id.clone()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
        assert!(manager.list_evidence(&EvidenceFilter::default()).is_empty());
    }

    #[test]
    fn test_investigation_lifecycle() {
        let manager = manager();
        assert_eq!(
            manager
                .create_investigation(NewInvestigation::named(""))
                .unwrap_err()
                .kind(),
            "invalid_argument"
        );
        assert_eq!(
            manager
                .complete_investigation("inv-missing", None)
                .unwrap_err()
                .kind(),
            "not_found"
        );

        let inv = manager
            .create_investigation(NewInvestigation::named("Case-004"))
            .unwrap();
        let done = manager.complete_investigation(&inv.id, None).unwrap();
        assert_eq!(done.status, InvestigationStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(
            manager
                .complete_investigation(&inv.id, None)
                .unwrap_err()
                .kind(),
            "invalid_state"
        );
        assert_eq!(manager.list_investigations().len(), 1);
    }

    #[test]
    fn test_auto_verify_and_seal_on_capture() {
        let manager = EvidenceManager::new(LedgerConfig {
            auto_verify_on_capture: true,
            auto_seal_on_capture: true,
            ..Default::default()
        })
        .unwrap();
        let ev = screenshot(&manager, None);
        assert!(ev.sealed);
        let actions: Vec<CustodyAction> = ev.custody_chain.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                CustodyAction::Collected,
                CustodyAction::Verified,
                CustodyAction::Sealed
            ]
        );
        assert_eq!(manager.audit_len(), 3);
    }

    #[test]
    fn test_active_package_resolution() {
        let manager = manager();
        assert_eq!(
            manager.resolve_package(None).unwrap_err().kind(),
            "not_initialized"
        );

        let first = manager.create_package(NewPackage::named("first")).unwrap();
        let second = manager.create_package(NewPackage::named("second")).unwrap();
        assert_eq!(manager.resolve_package(None).unwrap(), second.id);

        let before = manager.audit_len();
        manager.set_active_package(&first.id, Some("lead")).unwrap();
        assert_eq!(manager.resolve_package(None).unwrap(), first.id);
        assert_eq!(manager.resolve_package(Some("pkg-x")).unwrap(), "pkg-x");

        let log = manager.audit_log(&AuditFilter::default());
        assert_eq!(log.len(), before + 1);
        let switched = log.last().unwrap();
        assert_eq!(switched.action, AuditAction::PackageActivated);
        assert_eq!(switched.actor, "lead");
        assert_eq!(switched.package_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(switched.detail["previous"], json!(second.id));

        assert_eq!(
            manager.set_active_package("pkg-x", None).unwrap_err().kind(),
            "not_found"
        );
        assert_eq!(manager.audit_len(), before + 1);
    }

    #[test]
    fn test_verify_uses_recorded_algorithm() {
        let mut manager = EvidenceManager::new(LedgerConfig {
            hash_algorithm: HashAlgorithm::Sha512,
            ..LedgerConfig::default()
        })
        .unwrap();
        let ev = text(&manager, "<html>archived</html>");
        assert_eq!(ev.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(ev.content_hash.len(), HashAlgorithm::Sha512.hex_len());

        manager.config.hash_algorithm = HashAlgorithm::Sha256;
        let outcome = manager.verify(&ev.id, None).unwrap();
        assert!(outcome.verified);
        assert_eq!(outcome.actual_hash, ev.content_hash);
        assert_eq!(outcome.evidence.hash_algorithm, HashAlgorithm::Sha512);

        // Items collected after the change use the new default.
        let later = text(&manager, "<html>later</html>");
        assert_eq!(later.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(later.content_hash, sha256_str("<html>later</html>"));
    }

    #[test]
    fn test_audit_time_range_filter() {
        let manager = manager();
        let inv = manager
            .create_investigation(NewInvestigation::named("Case-007"))
            .unwrap();
        screenshot(&manager, Some(inv.id.as_str()));
        text(&manager, "<html></html>");
        manager.create_package(NewPackage::named("range")).unwrap();

        let all = manager.audit_log(&AuditFilter::default());
        let pivot = all[2].timestamp;

        let since = manager.audit_log(&AuditFilter {
            since: Some(pivot),
            ..Default::default()
        });
        let expected: Vec<AuditEntry> = all
            .iter()
            .filter(|e| e.timestamp >= pivot)
            .cloned()
            .collect();
        assert_eq!(since, expected);
        assert!(since.contains(&all[2]));
        assert!(since.contains(all.last().unwrap()));

        let until = manager.audit_log(&AuditFilter {
            until: Some(pivot),
            ..Default::default()
        });
        assert!(until.contains(&all[0]));
        assert!(until.contains(&all[2]));
        assert!(until.iter().all(|e| e.timestamp <= pivot));

        let window = manager.audit_log(&AuditFilter {
            since: Some(pivot),
            until: Some(pivot),
            ..Default::default()
        });
        assert!(window.contains(&all[2]));
        assert!(window.iter().all(|e| e.timestamp == pivot));

        let future: Timestamp = serde_json::from_value(json!("2999-01-01T00:00:00Z")).unwrap();
        let past: Timestamp = serde_json::from_value(json!("2000-01-01T00:00:00Z")).unwrap();
        assert!(manager
            .audit_log(&AuditFilter {
                since: Some(future),
                ..Default::default()
            })
            .is_empty());
        assert!(manager
            .audit_log(&AuditFilter {
                until: Some(past),
                ..Default::default()
            })
            .is_empty());
    }

    #[test]
    fn test_export_of_tampered_package_is_not_certified() {
        let manager = manager();
        let ev = screenshot(&manager, None);
        let pkg = manager.create_package(NewPackage::named("tampered")).unwrap();
        manager.add_to_package(&pkg.id, &ev.id, None).unwrap();
        manager.seal_package(&pkg.id, None).unwrap();
        tamper(&manager, &ev.id, Payload::Binary(b"<edited>".to_vec()));

        let export = manager
            .export_package(
                &pkg.id,
                ExportOptions {
                    format: ExportFormat::Compliance,
                    actor: Some("clerk".into()),
                    include_payload: None,
                },
            )
            .unwrap();
        let document = &export.document;

        assert!(!document.certification.integrity_verified);
        assert!(document.certification.statement.contains("NOT verified"));
        let verification = document.verification.as_ref().unwrap();
        assert_eq!(verification.tampered_members, vec![ev.id.clone()]);
        assert!(export.content.contains("NOT verified"));
        assert!(export.content.contains("Integrity verified at export: NO"));
    }

    #[test]
    fn test_access_is_recorded() {
        let manager = manager();
        let ev = screenshot(&manager, None);
        let payload = manager.access_evidence(&ev.id, Some("examiner")).unwrap();
        assert_eq!(payload, Payload::Binary(b"<png-bytes>".to_vec()));

        let record = manager.get_evidence(&ev.id).unwrap();
        let last = record.custody_chain.last().unwrap();
        assert_eq!(last.action, CustodyAction::Accessed);
        assert_eq!(last.actor, "examiner");
    }

    #[test]
    fn test_export_audit_records_itself() {
        let manager = manager();
        let inv = manager
            .create_investigation(NewInvestigation::named("audit"))
            .unwrap();
        screenshot(&manager, Some(inv.id.as_str()));
        screenshot(&manager, None);

        let export = manager
            .export_audit(
                &AuditFilter {
                    investigation_id: Some(inv.id.clone()),
                    ..Default::default()
                },
                Some("auditor"),
            )
            .unwrap();
        assert_eq!(export.entry_count, 2);
        assert_eq!(export.content.lines().count(), 2);
        assert!(export.chain.valid);

        let last = manager.audit_log(&AuditFilter::default()).pop().unwrap();
        assert_eq!(last.action, AuditAction::AuditExported);
        assert_eq!(last.actor, "auditor");
    }

    #[test]
    fn test_statistics() {
        let manager = manager();
        manager
            .create_investigation(NewInvestigation::named("stats"))
            .unwrap();
        let a = screenshot(&manager, None);
        text(&manager, "<html></html>");
        manager.seal(&a.id, None).unwrap();
        manager.verify(&a.id, None).unwrap();
        let pkg = manager.create_package(NewPackage::named("p")).unwrap();
        manager.add_to_package(&pkg.id, &a.id, None).unwrap();
        manager.seal_package(&pkg.id, None).unwrap();

        let stats = manager.statistics();
        assert_eq!(stats.investigations, 1);
        assert_eq!(stats.active_investigations, 1);
        assert_eq!(stats.evidence, 2);
        assert_eq!(stats.sealed_evidence, 1);
        assert_eq!(stats.evidence_by_type.get("screenshot"), Some(&1));
        assert_eq!(stats.evidence_by_type.get("dom_snapshot"), Some(&1));
        assert_eq!(stats.packages, 1);
        assert_eq!(stats.sealed_packages, 1);
        assert_eq!(stats.verifications, 1);
        assert_eq!(stats.verification_failures, 0);
        assert_eq!(stats.audit_entries, manager.audit_len() as u64);
    }

    #[test]
    fn test_concurrent_collection_keeps_chain_consistent() {
        let manager = manager();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let manager = &manager;
                scope.spawn(move || {
                    for i in 0..25 {
                        let ev = manager
                            .collect(
                                EvidenceType::ConsoleLog,
                                Payload::Text(format!("worker {} line {}", worker, i)),
                                CollectOptions::default(),
                            )
                            .unwrap();
                        manager.verify(&ev.id, None).unwrap();
                    }
                });
            }
        });

        assert_eq!(manager.statistics().evidence, 200);
        assert_eq!(manager.audit_len(), 400);
        assert!(manager.verify_audit_chain().valid);
        for record in manager.list_evidence(&EvidenceFilter::default()) {
            assert_eq!(record.custody_chain.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_notifications_follow_commits() {
        let manager = manager();
        let mut events = manager.subscribe();

        let inv = manager
            .create_investigation(NewInvestigation::named("notify"))
            .unwrap();
        let ev = screenshot(&manager, Some(inv.id.as_str()));

        let first = events.recv().await.unwrap();
        assert_eq!(first.action, AuditAction::InvestigationCreated);
        let second = events.recv().await.unwrap();
        assert_eq!(second.action, AuditAction::EvidenceCollected);
        assert_eq!(second.evidence_id.as_deref(), Some(ev.id.as_str()));
        assert!(second.seq > first.seq);
    }
}
