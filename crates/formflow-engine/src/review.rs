use chrono::Utc;
use thiserror::Error;

use formflow_spec::NotFoundError;

use crate::history::HistoryEntry;
use crate::response::{FormResponse, ResponseStatus};
use crate::store::{ResponseStore, StorageError};

/// Manual-review decisions on workflow-created or triggered responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
    /// Returns a rejected response to `pending` for another review round.
    Reopen,
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("a non-empty review comment is required")]
    EmptyComment,
    #[error("cannot apply {decision:?} to a response in status {from:?}")]
    InvalidTransition {
        from: ResponseStatus,
        decision: ReviewDecision,
    },
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Applies a review transition: `pending -> approved`, `pending ->
/// rejected`, or `rejected -> pending`. Every transition demands a comment
/// and appends a history entry.
pub fn apply_review(
    store: &dyn ResponseStore,
    response_id: &str,
    decision: ReviewDecision,
    comment: &str,
) -> Result<FormResponse, ReviewError> {
    if comment.trim().is_empty() {
        return Err(ReviewError::EmptyComment);
    }
    let mut response = store
        .get(response_id)?
        .ok_or_else(|| NotFoundError::Response(response_id.to_string()))?;

    let next = match (response.status, decision) {
        (ResponseStatus::Pending, ReviewDecision::Approve) => ResponseStatus::Approved,
        (ResponseStatus::Pending, ReviewDecision::Reject) => ResponseStatus::Rejected,
        (ResponseStatus::Rejected, ReviewDecision::Reopen) => ResponseStatus::Pending,
        (from, decision) => return Err(ReviewError::InvalidTransition { from, decision }),
    };

    response.status = next;
    response.updated_at = Utc::now();
    store.save(&response)?;
    store.append_history(HistoryEntry::status_changed(
        &response,
        Some(comment.trim().to_string()),
    ))?;
    Ok(response)
}
