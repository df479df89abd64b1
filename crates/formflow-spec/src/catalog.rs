use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::spec::FormVersion;

/// Lookup failure for a schema, workflow, or response identity. Surfaced
/// immediately, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("form '{0}' not found")]
    Form(String),
    #[error("form '{form_id}' has no version tagged '{tag}'")]
    Version { form_id: String, tag: String },
    #[error("form '{0}' has no active version")]
    NoActiveVersion(String),
    #[error("workflow '{0}' not found")]
    Workflow(String),
    #[error("response '{0}' not found")]
    Response(String),
}

/// Read-only access to the versioned schema graph. Soft-deleted forms are
/// reported as not found.
pub trait FormCatalog: Send + Sync {
    /// Resolves the version active at `at`. A submission calls this exactly
    /// once at its start and holds the result for its full lifetime.
    fn active_version(
        &self,
        form_id: &str,
        at: DateTime<Utc>,
    ) -> Result<FormVersion, NotFoundError>;

    /// Resolves a specific historical version, for re-validating a draft
    /// against the tag it was originally started under.
    fn resolve_version(&self, form_id: &str, tag: &str) -> Result<FormVersion, NotFoundError>;
}
