use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::ManifestGroup;
use crate::types::object::{ObjectKey, ObjectRef};

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors surfaced by an [`ObjectStore`](crate::infrastructure::ObjectStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The object does not exist. Callers treat this as a signal, not a failure.
    #[error("{0} not found")]
    NotFound(ObjectRef),

    #[error("{0} already exists")]
    AlreadyExists(ObjectRef),

    /// The concurrency token carried by an update no longer matches.
    #[error("conflict on {object}: {message}")]
    Conflict { object: ObjectRef, message: String },

    #[error("invalid object: {0}")]
    Invalid(String),

    /// Anything else the backend reports. Expected to be retried externally.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A required manifest group could not be found. Irrecoverable.
    #[error("manifest group '{0}' is not available")]
    MissingManifest(ManifestGroup),

    #[error("cannot read manifest {}: {source}", path.display())]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {kind} {key}: {source}")]
    Decode {
        kind: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot serialize {what}: {message}")]
    Serialize { what: &'static str, message: String },

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("failed to apply {object}: {source}")]
    Apply {
        object: ObjectRef,
        #[source]
        source: StoreError,
    },

    #[error("manifest group '{group}' failed: {source}")]
    Group {
        group: ManifestGroup,
        #[source]
        source: Box<EngineError>,
    },

    /// A tier references a platform that does not (yet) exist.
    #[error("tier {tier} targets platform {platform}, which does not exist")]
    TargetNotFound { tier: ObjectKey, platform: ObjectKey },

    /// One or more derived artifacts failed; every artifact was still attempted.
    #[error("aggregation for {platform} failed: {}", join_failures(.failures))]
    Aggregation {
        platform: ObjectKey,
        failures: Vec<(String, String)>,
    },

    /// Recompute after a tier deletion failed for some platforms.
    #[error("recompute failed for {} platform(s): {}", .0.len(), join_failures(.0))]
    Recompute(Vec<(String, String)>),

    #[error("operation cancelled")]
    Cancelled,
}

fn join_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(what, why)| format!("{}: {}", what, why))
        .collect::<Vec<_>>()
        .join("; ")
}
