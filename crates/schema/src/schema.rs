//! JSON schema definitions for export validation.

/// JSON Schema for a machine-readable package export.
pub const PACKAGE_EXPORT_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "$id": "https://custodian.dev/schemas/package-export.json",
  "title": "Custodian Evidence Package Export",
  "type": "object",
  "required": ["schema_version", "exported_at", "exported_by", "package", "evidence", "audit_trail", "audit_chain", "certification", "includes_payload"],
  "$defs": {
    "hash": {
      "type": "string",
      "pattern": "^([0-9a-f]{64}|[0-9a-f]{128})$"
    },
    "algorithm": {
      "type": "string",
      "enum": ["sha256", "sha512"]
    },
    "custody_event": {
      "type": "object",
      "required": ["action", "actor", "timestamp"],
      "properties": {
        "action": {
          "type": "string",
          "enum": ["collected", "verified", "verification-failed", "accessed", "exported", "sealed"]
        },
        "actor": { "type": "string" },
        "timestamp": { "type": "string", "format": "date-time" }
      }
    },
    "audit_entry": {
      "type": "object",
      "required": ["seq", "timestamp", "action", "actor", "detail", "prev_hash", "entry_hash"],
      "properties": {
        "seq": { "type": "integer", "minimum": 0 },
        "timestamp": { "type": "string", "format": "date-time" },
        "action": { "type": "string" },
        "actor": { "type": "string" },
        "investigation_id": { "type": ["string", "null"] },
        "evidence_id": { "type": ["string", "null"] },
        "package_id": { "type": ["string", "null"] },
        "prev_hash": { "$ref": "#/$defs/hash" },
        "entry_hash": { "$ref": "#/$defs/hash" }
      }
    }
  },
  "properties": {
    "schema_version": {
      "type": "string",
      "pattern": "^\\d+\\.\\d+\\.\\d+$"
    },
    "exported_at": { "type": "string", "format": "date-time" },
    "exported_by": { "type": "string", "minLength": 1 },
    "package": {
      "type": "object",
      "required": ["id", "name", "created_by", "created_at", "tags", "members", "annotations", "hash_algorithm", "sealed", "package_hash", "sealed_member_hashes"],
      "properties": {
        "id": { "type": "string" },
        "name": { "type": "string", "minLength": 1 },
        "description": { "type": ["string", "null"] },
        "case_id": { "type": ["string", "null"] },
        "investigation_id": { "type": ["string", "null"] },
        "created_by": { "type": "string" },
        "created_at": { "type": "string", "format": "date-time" },
        "members": { "type": "array", "items": { "type": "string" } },
        "annotations": {
          "type": "array",
          "items": {
            "type": "object",
            "required": ["author", "text", "created_at"]
          }
        },
        "hash_algorithm": { "$ref": "#/$defs/algorithm" },
        "sealed": { "type": "boolean" },
        "sealed_at": { "type": ["string", "null"] },
        "sealed_by": { "type": ["string", "null"] },
        "package_hash": {
          "oneOf": [{ "$ref": "#/$defs/hash" }, { "type": "null" }]
        },
        "sealed_member_hashes": { "type": "array", "items": { "$ref": "#/$defs/hash" } }
      }
    },
    "evidence": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["id", "evidence_type", "content_hash", "hash_algorithm", "size_bytes", "metadata", "tags", "collected_at", "collected_by", "sealed", "custody_chain", "custody_digest"],
        "properties": {
          "id": { "type": "string" },
          "evidence_type": {
            "type": "string",
            "enum": ["screenshot", "page_archive", "network_capture", "dom_snapshot", "console_log", "cookie_set", "storage_dump"]
          },
          "content_hash": { "$ref": "#/$defs/hash" },
          "hash_algorithm": { "$ref": "#/$defs/algorithm" },
          "size_bytes": { "type": "integer", "minimum": 1 },
          "metadata": { "type": "object" },
          "tags": { "type": "array", "items": { "type": "string" } },
          "collected_at": { "type": "string", "format": "date-time" },
          "collected_by": { "type": "string" },
          "sealed": { "type": "boolean" },
          "custody_chain": {
            "type": "array",
            "minItems": 1,
            "items": { "$ref": "#/$defs/custody_event" }
          },
          "custody_digest": { "$ref": "#/$defs/hash" },
          "payload": {
            "type": "object",
            "required": ["encoding", "data"],
            "properties": {
              "encoding": { "type": "string", "enum": ["base64", "text", "json"] }
            }
          }
        }
      }
    },
    "verification": {
      "oneOf": [
        { "type": "null" },
        {
          "type": "object",
          "required": ["package_id", "valid", "expected_hash", "actual_hash", "member_count"],
          "properties": {
            "valid": { "type": "boolean" },
            "expected_hash": { "$ref": "#/$defs/hash" },
            "actual_hash": { "$ref": "#/$defs/hash" },
            "member_count": { "type": "integer", "minimum": 0 }
          }
        }
      ]
    },
    "audit_trail": {
      "type": "array",
      "items": { "$ref": "#/$defs/audit_entry" }
    },
    "audit_chain": {
      "type": "object",
      "required": ["valid", "entries", "head_hash"]
    },
    "certification": {
      "type": "object",
      "required": ["statement", "certified_by", "certified_at", "hash_algorithm", "integrity_verified"],
      "properties": {
        "statement": { "type": "string", "minLength": 1 },
        "certified_by": { "type": "string" },
        "integrity_verified": { "type": "boolean" }
      }
    },
    "includes_payload": { "type": "boolean" }
  }
}"##;

/// JSON Schema for one line of an exported audit log.
pub const AUDIT_ENTRY_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "$id": "https://custodian.dev/schemas/audit-entry.json",
  "title": "Custodian Audit Entry",
  "type": "object",
  "required": ["seq", "timestamp", "action", "actor", "detail", "prev_hash", "entry_hash"],
  "properties": {
    "seq": { "type": "integer", "minimum": 0 },
    "timestamp": { "type": "string", "format": "date-time" },
    "action": { "type": "string", "pattern": "^[a-z]+(-[a-z]+)*$" },
    "actor": { "type": "string", "minLength": 1 },
    "investigation_id": { "type": ["string", "null"] },
    "evidence_id": { "type": ["string", "null"] },
    "package_id": { "type": ["string", "null"] },
    "prev_hash": { "type": "string", "pattern": "^[0-9a-f]{64}$" },
    "entry_hash": { "type": "string", "pattern": "^[0-9a-f]{64}$" }
  }
}"##;

/// Get the package export schema as a parsed JSON value.
pub fn package_export_schema() -> serde_json::Value {
    serde_json::from_str(PACKAGE_EXPORT_SCHEMA).expect("Invalid package export schema")
}

/// Get the audit entry schema as a parsed JSON value.
pub fn audit_entry_schema() -> serde_json::Value {
    serde_json::from_str(AUDIT_ENTRY_SCHEMA).expect("Invalid audit entry schema")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_parse() {
        assert!(package_export_schema().is_object());
        assert!(audit_entry_schema().is_object());
    }
}
