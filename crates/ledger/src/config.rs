//! Ledger configuration.

use custodian_common::{Error, HashAlgorithm, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Report format produced by exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Complete machine-readable JSON document.
    Json,
    /// Narrative Markdown report for human and legal review.
    Compliance,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Compliance => write!(f, "compliance"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "compliance" | "compliance-report" | "markdown" | "court" => {
                Ok(ExportFormat::Compliance)
            }
            _ => Err(Error::InvalidArgument(format!(
                "unsupported export format: {}",
                s
            ))),
        }
    }
}

/// Instance-wide ledger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Verify every item right after capture.
    pub auto_verify_on_capture: bool,
    /// Seal every item right after capture (and verification, if enabled).
    pub auto_seal_on_capture: bool,
    /// Digest used for new evidence and packages.
    pub hash_algorithm: HashAlgorithm,
    /// Formats exports may be rendered in.
    pub export_formats: Vec<ExportFormat>,
    /// Embed raw payloads in exports when the caller does not say.
    pub include_payload_by_default: bool,
    /// Actor recorded when a call names none.
    pub system_actor: String,
    /// Buffer size of the change-notification channel.
    pub notification_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            auto_verify_on_capture: false,
            auto_seal_on_capture: false,
            hash_algorithm: HashAlgorithm::Sha256,
            export_formats: vec![ExportFormat::Json, ExportFormat::Compliance],
            include_payload_by_default: false,
            system_actor: "system".to_string(),
            notification_capacity: 256,
        }
    }
}

impl LedgerConfig {
    /// Parse a YAML configuration; missing keys keep their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: LedgerConfig = serde_yaml::from_str(content)
            .map_err(|e| Error::InvalidArgument(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.export_formats.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one export format must be enabled".into(),
            ));
        }
        if self.system_actor.trim().is_empty() {
            return Err(Error::InvalidArgument("system actor must not be empty".into()));
        }
        if self.notification_capacity == 0 {
            return Err(Error::InvalidArgument(
                "notification capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn supports(&self, format: ExportFormat) -> bool {
        self.export_formats.contains(&format)
    }
}
