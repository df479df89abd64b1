use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status of a response. Draft responses stay editable; everything else is
/// mutated only through explicit status transitions, each of which appends
/// a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Draft,
    Submitted,
    Pending,
    Approved,
    Rejected,
}

/// A submitted or in-progress response. `version_tag` permanently records
/// the schema version it was validated against; it is never migrated to a
/// newer version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormResponse {
    pub id: String,
    pub form_id: String,
    pub version_tag: String,
    pub status: ResponseStatus,
    /// Hidden-field-stripped nested section/question mapping.
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
