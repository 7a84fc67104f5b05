//! Common error types for custodian.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The kind of ledger entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Investigation,
    Evidence,
    Package,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Investigation => write!(f, "investigation"),
            EntityKind::Evidence => write!(f, "evidence"),
            EntityKind::Package => write!(f, "package"),
        }
    }
}

/// Common error type for custodian operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{kind} {id} is already sealed")]
    AlreadySealed { kind: EntityKind, id: String },

    #[error("{kind} {id} is sealed and cannot be modified")]
    Immutable { kind: EntityKind, id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn already_sealed(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::AlreadySealed {
            kind,
            id: id.into(),
        }
    }

    pub fn immutable(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::Immutable {
            kind,
            id: id.into(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::AlreadySealed { .. } => "already_sealed",
            Error::Immutable { .. } => "immutable",
            Error::InvalidState(_) => "invalid_state",
            Error::NotInitialized(_) => "not_initialized",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Other(_) => "other",
        }
    }
}
