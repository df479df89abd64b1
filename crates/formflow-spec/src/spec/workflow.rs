use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Side effect kinds a workflow can order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateSubForm,
    Notify,
    AssignTask,
}

/// Where a mapped target field draws its value from: a path into the
/// trigger context (`{"path": "response.description"}`) or a literal JSON
/// value copied verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum MappingSource {
    Path { path: String },
    Literal(Value),
}

/// One ordered step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_form_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_mapping: BTreeMap<String, MappingSource>,
    /// Names a mapped target field whose value becomes the created
    /// response's assignee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_to_user_field: Option<String>,
    /// Handlebars template rendered against the trigger context for
    /// `notify`/`assign_task` emissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
}

/// A trigger-condition-to-actions binding evaluated after each final
/// submission on the triggering form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Workflow {
    pub id: String,
    pub trigger_form_id: String,
    /// Sandbox expression over the cleaned response; absent means always
    /// triggered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_condition: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub actions: Vec<WorkflowAction>,
}

fn default_active() -> bool {
    true
}
