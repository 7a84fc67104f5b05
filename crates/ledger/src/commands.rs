//! Command interface to the ledger.
//!
//! Every operation is a JSON object tagged by `command`. Parameters and
//! results both use snake_case keys, the same as exported documents, and an
//! unrecognized parameter is rejected. Execution never fails outright: the
//! outcome is always a [`CommandResponse`] carrying either a result or an
//! error reason and code.

use crate::config::ExportFormat;
use crate::manager::{
    CollectOptions, EvidenceFilter, EvidenceManager, ExportOptions, NewAnnotation,
    NewInvestigation, NewPackage,
};
use custodian_common::{Error, Result, Timestamp};
use custodian_schema::{AuditAction, AuditFilter, EvidenceMetadata, EvidenceType, Payload};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One ledger operation with its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CreateInvestigation(CreateInvestigationParams),
    CompleteInvestigation(InvestigationParams),
    GetInvestigation(InvestigationParams),
    ListInvestigations,
    CollectEvidence(CollectEvidenceParams),
    VerifyEvidence(EvidenceParams),
    SealEvidence(EvidenceParams),
    TagEvidence(TagEvidenceParams),
    UpdateEvidenceMetadata(UpdateMetadataParams),
    AccessEvidence(EvidenceParams),
    GetEvidence(EvidenceParams),
    ListEvidence(ListEvidenceParams),
    ExportEvidence(ExportEvidenceParams),
    CreatePackage(CreatePackageParams),
    SetActivePackage(PackageParams),
    AddToPackage(AddToPackageParams),
    AnnotatePackage(AnnotatePackageParams),
    SealPackage(PackageParams),
    VerifyPackage(PackageParams),
    GetPackage(PackageParams),
    ListPackages,
    ExportPackage(ExportPackageParams),
    GetAuditLog(AuditLogParams),
    ExportAuditLog(AuditLogParams),
    VerifyAuditChain,
    GetStatistics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateInvestigationParams {
    pub name: Option<String>,
    pub description: Option<String>,
    pub investigator: Option<String>,
    pub case_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InvestigationParams {
    pub investigation_id: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectEvidenceParams {
    /// Evidence type name; aliases such as `har` are accepted.
    #[serde(rename = "type")]
    pub evidence_type: Option<String>,
    /// A `{"encoding", "data"}` object, a plain string, or any other JSON.
    /// Only an object with exactly those two keys and a known encoding is
    /// read as the tagged form.
    pub payload: Option<Value>,
    pub actor: Option<String>,
    pub tags: Vec<String>,
    pub case_id: Option<String>,
    pub investigation_id: Option<String>,
    pub metadata: EvidenceMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvidenceParams {
    pub evidence_id: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagEvidenceParams {
    pub evidence_id: Option<String>,
    pub tags: Vec<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateMetadataParams {
    pub evidence_id: Option<String>,
    pub metadata: Option<EvidenceMetadata>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListEvidenceParams {
    pub investigation_id: Option<String>,
    pub case_id: Option<String>,
    #[serde(rename = "type")]
    pub evidence_type: Option<String>,
    pub tag: Option<String>,
    pub sealed: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportEvidenceParams {
    pub evidence_id: Option<String>,
    pub format: Option<String>,
    pub actor: Option<String>,
    pub include_payload: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreatePackageParams {
    pub name: Option<String>,
    pub description: Option<String>,
    pub case_id: Option<String>,
    pub investigation_id: Option<String>,
    pub actor: Option<String>,
    pub tags: Vec<String>,
}

/// Parameters for package operations; the package defaults to the active one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageParams {
    pub package_id: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AddToPackageParams {
    pub package_id: Option<String>,
    pub evidence_id: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnnotatePackageParams {
    pub package_id: Option<String>,
    pub author: Option<String>,
    pub text: Option<String>,
    pub evidence_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportPackageParams {
    pub package_id: Option<String>,
    pub format: Option<String>,
    pub actor: Option<String>,
    pub include_payload: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditLogParams {
    pub investigation_id: Option<String>,
    pub actor: Option<String>,
    pub action: Option<String>,
    pub evidence_id: Option<String>,
    pub package_id: Option<String>,
    /// Inclusive RFC 3339 bounds.
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
    /// Actor recorded for `export_audit_log`.
    pub exported_by: Option<String>,
}

impl Command {
    /// Parse one command object. Malformed input is an `InvalidArgument`.
    pub fn parse(input: &str) -> Result<Self> {
        serde_json::from_str(input)
            .map_err(|e| Error::InvalidArgument(format!("malformed command: {}", e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateInvestigation(_) => "create_investigation",
            Command::CompleteInvestigation(_) => "complete_investigation",
            Command::GetInvestigation(_) => "get_investigation",
            Command::ListInvestigations => "list_investigations",
            Command::CollectEvidence(_) => "collect_evidence",
            Command::VerifyEvidence(_) => "verify_evidence",
            Command::SealEvidence(_) => "seal_evidence",
            Command::TagEvidence(_) => "tag_evidence",
            Command::UpdateEvidenceMetadata(_) => "update_evidence_metadata",
            Command::AccessEvidence(_) => "access_evidence",
            Command::GetEvidence(_) => "get_evidence",
            Command::ListEvidence(_) => "list_evidence",
            Command::ExportEvidence(_) => "export_evidence",
            Command::CreatePackage(_) => "create_package",
            Command::SetActivePackage(_) => "set_active_package",
            Command::AddToPackage(_) => "add_to_package",
            Command::AnnotatePackage(_) => "annotate_package",
            Command::SealPackage(_) => "seal_package",
            Command::VerifyPackage(_) => "verify_package",
            Command::GetPackage(_) => "get_package",
            Command::ListPackages => "list_packages",
            Command::ExportPackage(_) => "export_package",
            Command::GetAuditLog(_) => "get_audit_log",
            Command::ExportAuditLog(_) => "export_audit_log",
            Command::VerifyAuditChain => "verify_audit_chain",
            Command::GetStatistics => "get_statistics",
        }
    }
}

/// Structured outcome of one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable error code, e.g. `already_sealed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl CommandResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
        }
    }
}

impl From<Result<Value>> for CommandResponse {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(value) => CommandResponse::ok(value),
            Err(e) => CommandResponse::failure(&e),
        }
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::InvalidArgument(format!("{} is required", field)))
}

fn parse_format(format: Option<String>) -> Result<ExportFormat> {
    format.map_or(Ok(ExportFormat::Json), |f| f.parse())
}

const PAYLOAD_ENCODINGS: [&str; 3] = ["base64", "text", "json"];

/// Whether `value` is the tagged `{"encoding", "data"}` payload form rather
/// than captured JSON that happens to carry an `encoding` key.
fn is_tagged_payload(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.len() == 2
                && map.contains_key("data")
                && map
                    .get("encoding")
                    .and_then(Value::as_str)
                    .map_or(false, |e| PAYLOAD_ENCODINGS.contains(&e))
        }
        _ => false,
    }
}

/// Interpret a wire payload value.
fn parse_payload(value: Value) -> Result<Payload> {
    if is_tagged_payload(&value) {
        return serde_json::from_value(value)
            .map_err(|e| Error::InvalidArgument(format!("invalid payload: {}", e)));
    }
    match value {
        Value::String(text) => Ok(Payload::Text(text)),
        other => Ok(Payload::Structured(other)),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Executes commands against one ledger instance.
#[derive(Clone)]
pub struct LedgerCommands {
    manager: Arc<EvidenceManager>,
}

impl LedgerCommands {
    pub fn new(manager: Arc<EvidenceManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &EvidenceManager {
        &self.manager
    }

    /// Parse and execute one JSON command.
    pub fn execute_json(&self, input: &str) -> CommandResponse {
        match Command::parse(input) {
            Ok(command) => self.execute(command),
            Err(e) => CommandResponse::failure(&e),
        }
    }

    pub fn execute(&self, command: Command) -> CommandResponse {
        let name = command.name();
        let response = CommandResponse::from(self.dispatch(command));
        debug!(command = name, success = response.success, "Command executed");
        response
    }

    fn dispatch(&self, command: Command) -> Result<Value> {
        let m = &*self.manager;
        match command {
            Command::CreateInvestigation(p) => to_value(&m.create_investigation(NewInvestigation {
                name: required(p.name, "name")?,
                description: p.description,
                investigator: p.investigator,
                case_id: p.case_id,
                metadata: p.metadata,
            })?),
            Command::CompleteInvestigation(p) => {
                let id = required(p.investigation_id, "investigation_id")?;
                to_value(&m.complete_investigation(&id, p.actor.as_deref())?)
            }
            Command::GetInvestigation(p) => {
                let id = required(p.investigation_id, "investigation_id")?;
                let investigation = m.get_investigation(&id)?;
                Ok(json!({
                    "investigation": investigation,
                    "stats": investigation.stats,
                }))
            }
            Command::ListInvestigations => to_value(&m.list_investigations()),

            Command::CollectEvidence(p) => {
                let evidence_type: EvidenceType = required(p.evidence_type, "type")?.parse()?;
                let payload = parse_payload(required(p.payload, "payload")?)?;
                to_value(&m.collect(
                    evidence_type,
                    payload,
                    CollectOptions {
                        metadata: p.metadata,
                        actor: p.actor,
                        tags: p.tags,
                        case_id: p.case_id,
                        investigation_id: p.investigation_id,
                    },
                )?)
            }
            Command::VerifyEvidence(p) => {
                let id = required(p.evidence_id, "evidence_id")?;
                to_value(&m.verify(&id, p.actor.as_deref())?)
            }
            Command::SealEvidence(p) => {
                let id = required(p.evidence_id, "evidence_id")?;
                to_value(&m.seal(&id, p.actor.as_deref())?)
            }
            Command::TagEvidence(p) => {
                let id = required(p.evidence_id, "evidence_id")?;
                to_value(&m.add_tags(&id, p.tags, p.actor.as_deref())?)
            }
            Command::UpdateEvidenceMetadata(p) => {
                let id = required(p.evidence_id, "evidence_id")?;
                let metadata = required(p.metadata, "metadata")?;
                to_value(&m.update_metadata(&id, metadata, p.actor.as_deref())?)
            }
            Command::AccessEvidence(p) => {
                let id = required(p.evidence_id, "evidence_id")?;
                let payload = m.access_evidence(&id, p.actor.as_deref())?;
                Ok(json!({ "evidence_id": id, "payload": payload }))
            }
            Command::GetEvidence(p) => {
                let id = required(p.evidence_id, "evidence_id")?;
                to_value(&m.get_evidence(&id)?)
            }
            Command::ListEvidence(p) => {
                let evidence_type = p
                    .evidence_type
                    .map(|t| t.parse::<EvidenceType>())
                    .transpose()?;
                to_value(&m.list_evidence(&EvidenceFilter {
                    investigation_id: p.investigation_id,
                    case_id: p.case_id,
                    evidence_type,
                    tag: p.tag,
                    sealed: p.sealed,
                }))
            }
            Command::ExportEvidence(p) => {
                let id = required(p.evidence_id, "evidence_id")?;
                let options = ExportOptions {
                    format: parse_format(p.format)?,
                    actor: p.actor,
                    include_payload: p.include_payload,
                };
                to_value(&m.export_evidence(&id, options)?)
            }

            Command::CreatePackage(p) => to_value(&m.create_package(NewPackage {
                name: required(p.name, "name")?,
                description: p.description,
                case_id: p.case_id,
                investigation_id: p.investigation_id,
                actor: p.actor,
                tags: p.tags,
            })?),
            Command::SetActivePackage(p) => {
                let id = required(p.package_id, "package_id")?;
                to_value(&m.set_active_package(&id, p.actor.as_deref())?)
            }
            Command::AddToPackage(p) => {
                let evidence_id = required(p.evidence_id, "evidence_id")?;
                let package_id = m.resolve_package(p.package_id.as_deref())?;
                to_value(&m.add_to_package(&package_id, &evidence_id, p.actor.as_deref())?)
            }
            Command::AnnotatePackage(p) => {
                let package_id = m.resolve_package(p.package_id.as_deref())?;
                to_value(&m.annotate_package(
                    &package_id,
                    NewAnnotation {
                        author: required(p.author, "author")?,
                        text: required(p.text, "text")?,
                        evidence_ids: p.evidence_ids,
                    },
                )?)
            }
            Command::SealPackage(p) => {
                let package_id = m.resolve_package(p.package_id.as_deref())?;
                to_value(&m.seal_package(&package_id, p.actor.as_deref())?)
            }
            Command::VerifyPackage(p) => {
                let package_id = m.resolve_package(p.package_id.as_deref())?;
                to_value(&m.verify_package(&package_id, p.actor.as_deref())?)
            }
            Command::GetPackage(p) => {
                let package_id = m.resolve_package(p.package_id.as_deref())?;
                to_value(&m.get_package(&package_id)?)
            }
            Command::ListPackages => Ok(json!({
                "packages": m.list_packages(),
                "active_package": m.active_package(),
            })),
            Command::ExportPackage(p) => {
                let package_id = m.resolve_package(p.package_id.as_deref())?;
                let options = ExportOptions {
                    format: parse_format(p.format)?,
                    actor: p.actor,
                    include_payload: p.include_payload,
                };
                to_value(&m.export_package(&package_id, options)?)
            }

            Command::GetAuditLog(p) => {
                let (filter, _) = audit_filter(p)?;
                to_value(&m.audit_log(&filter))
            }
            Command::ExportAuditLog(p) => {
                let (filter, exported_by) = audit_filter(p)?;
                to_value(&m.export_audit(&filter, exported_by.as_deref())?)
            }
            Command::VerifyAuditChain => to_value(&m.verify_audit_chain()),
            Command::GetStatistics => to_value(&m.statistics()),
        }
    }
}

fn audit_filter(p: AuditLogParams) -> Result<(AuditFilter, Option<String>)> {
    let action = p.action.map(|a| a.parse::<AuditAction>()).transpose()?;
    Ok((
        AuditFilter {
            investigation_id: p.investigation_id,
            actor: p.actor,
            action,
            evidence_id: p.evidence_id,
            package_id: p.package_id,
            since: p.since,
            until: p.until,
        },
        p.exported_by,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;

    fn commands() -> LedgerCommands {
        LedgerCommands::new(Arc::new(
            EvidenceManager::new(LedgerConfig::default()).unwrap(),
        ))
    }

    fn run(commands: &LedgerCommands, input: Value) -> CommandResponse {
        commands.execute_json(&input.to_string())
    }

    fn result_str(response: &CommandResponse, field: &str) -> String {
        response.result.as_ref().unwrap()[field]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_walkthrough_through_commands() {
        let commands = commands();
        let inv = run(
            &commands,
            json!({"command": "create_investigation", "name": "Case-001"}),
        );
        assert!(inv.success);
        let inv_id = result_str(&inv, "id");

        let ev = run(
            &commands,
            json!({
                "command": "collect_evidence",
                "type": "screenshot",
                "payload": {"encoding": "base64", "data": "PHBuZy1ieXRlcz4="},
                "actor": "investigator",
                "investigation_id": inv_id,
            }),
        );
        assert!(ev.success, "{:?}", ev.error);
        assert_eq!(
            result_str(&ev, "content_hash"),
            "acd7b75ef399f93f76d2b922cdb734e2401a68726492acb036b22cb61eb43439"
        );
        let ev_id = result_str(&ev, "id");

        let verified = run(
            &commands,
            json!({"command": "verify_evidence", "evidence_id": ev_id}),
        );
        assert_eq!(verified.result.unwrap()["verified"], json!(true));

        let sealed = run(&commands, json!({"command": "seal_evidence", "evidence_id": ev_id}));
        assert_eq!(sealed.result.unwrap()["sealed"], json!(true));

        let tagged = run(
            &commands,
            json!({"command": "tag_evidence", "evidence_id": ev_id, "tags": ["late"]}),
        );
        assert!(!tagged.success);
        assert_eq!(tagged.error_kind.as_deref(), Some("already_sealed"));

        assert!(run(&commands, json!({"command": "create_package", "name": "bundle"})).success);
        // No package_id: the active package is used.
        assert!(run(&commands, json!({"command": "add_to_package", "evidence_id": ev_id})).success);
        let sealed_pkg = run(&commands, json!({"command": "seal_package"}));
        assert!(sealed_pkg.success);
        assert_eq!(
            result_str(&sealed_pkg, "package_hash"),
            custodian_common::hash::sha256_str(
                "acd7b75ef399f93f76d2b922cdb734e2401a68726492acb036b22cb61eb43439"
            )
        );

        let log = run(
            &commands,
            json!({"command": "get_audit_log", "investigation_id": inv_id}),
        );
        let actions: Vec<String> = log.result.unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["action"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            actions,
            vec![
                "investigation-created",
                "evidence-collected",
                "evidence-verified",
                "evidence-sealed",
            ]
        );
    }

    #[test]
    fn test_failures_are_structured() {
        let commands = commands();

        let response = commands.execute_json("{not json");
        assert!(!response.success);
        assert_eq!(response.error_kind.as_deref(), Some("invalid_argument"));

        let response = run(&commands, json!({"command": "launch_rocket"}));
        assert_eq!(response.error_kind.as_deref(), Some("invalid_argument"));

        let response = run(&commands, json!({"command": "create_investigation"}));
        assert_eq!(response.error_kind.as_deref(), Some("invalid_argument"));
        assert!(response.error.unwrap().contains("name"));

        let response = run(
            &commands,
            json!({"command": "collect_evidence", "type": "hologram", "payload": "x"}),
        );
        assert_eq!(response.error_kind.as_deref(), Some("invalid_argument"));

        let response = run(
            &commands,
            json!({"command": "verify_evidence", "evidence_id": "ev-missing"}),
        );
        assert_eq!(response.error_kind.as_deref(), Some("not_found"));

        let response = run(&commands, json!({"command": "seal_package"}));
        assert_eq!(response.error_kind.as_deref(), Some("not_initialized"));

        let response = run(
            &commands,
            json!({"command": "get_audit_log", "action": "evidence-exploded"}),
        );
        assert_eq!(response.error_kind.as_deref(), Some("invalid_argument"));
    }

    #[test]
    fn test_payload_forms() {
        assert_eq!(
            parse_payload(json!("<html></html>")).unwrap(),
            Payload::Text("<html></html>".into())
        );
        assert_eq!(
            parse_payload(json!([{"name": "sid"}])).unwrap(),
            Payload::Structured(json!([{"name": "sid"}]))
        );
        assert_eq!(
            parse_payload(json!({"encoding": "text", "data": "hi"})).unwrap(),
            Payload::Text("hi".into())
        );
        assert!(parse_payload(json!({"encoding": "base64", "data": "%%%"})).is_err());
    }

    #[test]
    fn test_captured_json_with_encoding_key_is_structured() {
        let dump = json!({"encoding": "gzip", "theme": "dark"});
        assert_eq!(
            parse_payload(dump.clone()).unwrap(),
            Payload::Structured(dump.clone())
        );
        let extra_key = json!({"encoding": "text", "data": "hi", "origin": "https://a.test"});
        assert_eq!(
            parse_payload(extra_key.clone()).unwrap(),
            Payload::Structured(extra_key)
        );
        let unknown = json!({"encoding": "gzip", "data": "H4sI"});
        assert_eq!(
            parse_payload(unknown.clone()).unwrap(),
            Payload::Structured(unknown)
        );

        let commands = commands();
        let response = run(
            &commands,
            json!({"command": "collect_evidence", "type": "storage_dump", "payload": dump}),
        );
        assert!(response.success, "{:?}", response.error);
        assert_eq!(
            response.result.unwrap()["content_hash"],
            json!(custodian_common::hash::sha256_str(r#"{"encoding":"gzip","theme":"dark"}"#))
        );
    }

    #[test]
    fn test_metadata_and_parameter_keys_are_checked() {
        let commands = commands();

        let response = run(
            &commands,
            json!({
                "command": "collect_evidence",
                "type": "screenshot",
                "payload": "png",
                "metadata": {"sourceUrl": "https://example.com", "title": "t"},
            }),
        );
        assert!(!response.success);
        assert_eq!(response.error_kind.as_deref(), Some("invalid_argument"));
        assert!(response.error.unwrap().contains("sourceUrl"));

        let response = run(
            &commands,
            json!({"command": "verify_evidence", "evidenceId": "ev-1"}),
        );
        assert_eq!(response.error_kind.as_deref(), Some("invalid_argument"));

        let response = run(
            &commands,
            json!({
                "command": "collect_evidence",
                "type": "screenshot",
                "payload": "png",
                "metadata": {"source_url": "https://example.com", "title": "t"},
            }),
        );
        assert!(response.success, "{:?}", response.error);
        let metadata = &response.result.unwrap()["metadata"];
        assert_eq!(metadata["source_url"], json!("https://example.com"));
        assert_eq!(metadata["title"], json!("t"));
    }

    #[test]
    fn test_response_keys_are_snake_case() {
        let response = CommandResponse::failure(&Error::InvalidArgument("x".into()));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error_kind"], json!("invalid_argument"));
        assert!(value.get("errorKind").is_none());
    }

    #[test]
    fn test_export_and_statistics() {
        let commands = commands();
        let ev = run(
            &commands,
            json!({"command": "collect_evidence", "type": "har", "payload": {"log": {"entries": []}}}),
        );
        let ev_id = result_str(&ev, "id");
        run(&commands, json!({"command": "create_package", "name": "net"}));
        run(&commands, json!({"command": "add_to_package", "evidence_id": ev_id}));
        run(&commands, json!({"command": "seal_package"}));

        let export = run(
            &commands,
            json!({"command": "export_package", "format": "compliance", "actor": "clerk"}),
        );
        assert!(export.success);
        let result = export.result.unwrap();
        assert_eq!(result["format"], json!("compliance"));
        assert!(result["content"].as_str().unwrap().contains("I, clerk, certify"));

        let stats = run(&commands, json!({"command": "get_statistics"}));
        let stats = stats.result.unwrap();
        assert_eq!(stats["evidence"], json!(1));
        assert_eq!(stats["sealed_packages"], json!(1));
        assert_eq!(stats["evidence_by_type"]["network_capture"], json!(1));

        let chain = run(&commands, json!({"command": "verify_audit_chain"}));
        assert_eq!(chain.result.unwrap()["valid"], json!(true));
    }
}
