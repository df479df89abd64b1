use thiserror::Error;

use formflow_spec::Workflow;

use crate::history::HistoryEntry;
use crate::response::FormResponse;

/// Transient persistence failure. Safe to retry: validation is pure and
/// side-effect-free, so a retried submission simply re-validates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("storage unavailable: {0}")]
pub struct StorageError(pub String);

/// Persistence collaborator for responses and their audit trail.
pub trait ResponseStore: Send + Sync {
    fn save(&self, response: &FormResponse) -> Result<(), StorageError>;
    fn get(&self, response_id: &str) -> Result<Option<FormResponse>, StorageError>;
    fn append_history(&self, entry: HistoryEntry) -> Result<(), StorageError>;
    fn history(&self, response_id: &str) -> Result<Vec<HistoryEntry>, StorageError>;
}

/// Persistence collaborator for workflow definitions.
pub trait WorkflowStore: Send + Sync {
    /// Active workflows whose trigger form matches, in a stable order.
    fn active_workflows(&self, trigger_form_id: &str) -> Result<Vec<Workflow>, StorageError>;
}
