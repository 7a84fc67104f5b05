//! Custodian ledger - chain-of-custody tracking for captured web evidence.
//!
//! [`EvidenceManager`] is the single authority over investigations, evidence
//! items, packages and the audit log of one process. Construct it once and
//! share it (behind an `Arc`) with whatever front end drives it; the
//! [`commands`] module provides the structured command interface.

pub mod archive;
pub mod commands;
pub mod config;
pub mod export;
pub mod manager;
pub mod notify;

pub use commands::{Command, CommandResponse, LedgerCommands};
pub use config::{ExportFormat, LedgerConfig};
pub use manager::{
    AuditExport, CollectOptions, EvidenceFilter, EvidenceManager, ExportOptions, LedgerStats,
    NewAnnotation, NewInvestigation, NewPackage, Rendered, VerificationOutcome,
};
pub use notify::{LedgerEvent, Notifier};
