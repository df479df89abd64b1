use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::response::{FormResponse, ResponseStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Created,
    Updated,
    StatusChanged,
    WorkflowTriggered,
}

/// Append-only audit record for a response. Entries are immutable once
/// appended; administrators read workflow outcomes here, submitters never
/// see them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub response_id: String,
    pub kind: HistoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn created(response: &FormResponse) -> HistoryEntry {
        HistoryEntry {
            response_id: response.id.clone(),
            kind: HistoryKind::Created,
            status: Some(response.status),
            comment: None,
            at: response.created_at,
        }
    }

    pub fn updated(response: &FormResponse) -> HistoryEntry {
        HistoryEntry {
            response_id: response.id.clone(),
            kind: HistoryKind::Updated,
            status: Some(response.status),
            comment: None,
            at: response.updated_at,
        }
    }

    pub fn status_changed(response: &FormResponse, comment: Option<String>) -> HistoryEntry {
        HistoryEntry {
            response_id: response.id.clone(),
            kind: HistoryKind::StatusChanged,
            status: Some(response.status),
            comment,
            at: response.updated_at,
        }
    }

    pub fn workflow_triggered(response_id: &str, workflow_id: &str, at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            response_id: response_id.to_string(),
            kind: HistoryKind::WorkflowTriggered,
            status: None,
            comment: Some(format!("workflow '{workflow_id}' evaluated")),
            at,
        }
    }
}
