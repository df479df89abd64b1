use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use uuid::Uuid;

use formflow_spec::expr::{Context, Expr, Literal, Segment};
use formflow_spec::{
    ActionKind, FormCatalog, MappingSource, NotFoundError, Workflow, WorkflowAction,
};

use crate::history::HistoryEntry;
use crate::notify::{DeliveryError, MessageRenderer, NotificationSink};
use crate::response::{FormResponse, ResponseStatus};
use crate::store::{ResponseStore, StorageError, WorkflowStore};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("response '{0}' is still a draft")]
    DraftResponse(String),
}

/// Failure of a single action. Isolated: logged, recorded in the execution
/// result, never propagated to the submitter and never rolled back.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action has no target form")]
    MissingTargetForm,
    #[error("template render failed: {0}")]
    Template(#[from] handlebars::RenderError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Guards each action execution with an atomic check-and-set keyed by
/// `(workflow_id, action_index, triggering_response_id)`. A narrow per-key
/// guard, not a global lock: concurrent redeliveries of the same triggering
/// submission cannot duplicate a side effect, while unrelated pairs never
/// contend.
#[derive(Default)]
pub struct IdempotencyLedger {
    claims: Mutex<BTreeSet<(String, usize, String)>>,
}

impl IdempotencyLedger {
    pub fn new() -> IdempotencyLedger {
        IdempotencyLedger::default()
    }

    /// Claims the key; `false` means another execution already holds it.
    pub fn try_claim(&self, workflow_id: &str, action_index: usize, response_id: &str) -> bool {
        self.claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((
                workflow_id.to_string(),
                action_index,
                response_id.to_string(),
            ))
    }

    /// Releases a claim after a failed execution so a later retry can run
    /// the action again.
    pub fn release(&self, workflow_id: &str, action_index: usize, response_id: &str) {
        self.claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&(
                workflow_id.to_string(),
                action_index,
                response_id.to_string(),
            ));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Executed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub action_index: usize,
    pub kind: ActionKind,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowExecutionResult {
    pub workflow_id: String,
    pub triggered: bool,
    pub actions: Vec<ActionOutcome>,
}

/// Evaluates workflows against freshly persisted non-draft responses and
/// executes their actions best-effort: one action's failure never rolls
/// back the submission, prior actions, or later workflows.
pub struct WorkflowEngine {
    catalog: Arc<dyn FormCatalog>,
    responses: Arc<dyn ResponseStore>,
    workflows: Arc<dyn WorkflowStore>,
    sink: Arc<dyn NotificationSink>,
    ledger: IdempotencyLedger,
    renderer: MessageRenderer,
}

impl WorkflowEngine {
    pub fn new(
        catalog: Arc<dyn FormCatalog>,
        responses: Arc<dyn ResponseStore>,
        workflows: Arc<dyn WorkflowStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> WorkflowEngine {
        WorkflowEngine {
            catalog,
            responses,
            workflows,
            sink,
            ledger: IdempotencyLedger::new(),
            renderer: MessageRenderer::new(),
        }
    }

    pub fn evaluate_workflows(
        &self,
        response_id: &str,
    ) -> Result<Vec<WorkflowExecutionResult>, WorkflowError> {
        let response = self
            .responses
            .get(response_id)?
            .ok_or_else(|| NotFoundError::Response(response_id.to_string()))?;
        if response.status == ResponseStatus::Draft {
            return Err(WorkflowError::DraftResponse(response_id.to_string()));
        }

        let trigger_json = trigger_json(&response);
        let ctx = trigger_context(&trigger_json);

        let mut results = Vec::new();
        for workflow in self.workflows.active_workflows(&response.form_id)? {
            let triggered = match &workflow.trigger_condition {
                None => true,
                Some(condition) => Expr::parse(condition)
                    .map(|expr| expr.truthy(&ctx))
                    .unwrap_or(false),
            };
            if !triggered {
                results.push(WorkflowExecutionResult {
                    workflow_id: workflow.id.clone(),
                    triggered: false,
                    actions: vec![],
                });
                continue;
            }

            let mut outcomes = Vec::with_capacity(workflow.actions.len());
            for (action_index, action) in workflow.actions.iter().enumerate() {
                if !self.ledger.try_claim(&workflow.id, action_index, &response.id) {
                    tracing::debug!(
                        workflow_id = %workflow.id,
                        action_index,
                        response_id = %response.id,
                        "action already executed, skipping"
                    );
                    outcomes.push(ActionOutcome {
                        action_index,
                        kind: action.kind,
                        status: ActionStatus::Skipped,
                        created_response_id: None,
                        error: None,
                    });
                    continue;
                }
                match self.execute_action(&workflow, action, &trigger_json, &response) {
                    Ok(created_response_id) => outcomes.push(ActionOutcome {
                        action_index,
                        kind: action.kind,
                        status: ActionStatus::Executed,
                        created_response_id,
                        error: None,
                    }),
                    Err(error) => {
                        self.ledger.release(&workflow.id, action_index, &response.id);
                        tracing::warn!(
                            workflow_id = %workflow.id,
                            action_index,
                            response_id = %response.id,
                            %error,
                            "workflow action failed"
                        );
                        outcomes.push(ActionOutcome {
                            action_index,
                            kind: action.kind,
                            status: ActionStatus::Failed,
                            created_response_id: None,
                            error: Some(error.to_string()),
                        });
                    }
                }
            }

            // Audit trail on the triggering response; best-effort like the
            // actions themselves.
            let entry =
                HistoryEntry::workflow_triggered(&response.id, &workflow.id, Utc::now());
            if let Err(error) = self.responses.append_history(entry) {
                tracing::warn!(workflow_id = %workflow.id, %error, "history append failed");
            }

            results.push(WorkflowExecutionResult {
                workflow_id: workflow.id.clone(),
                triggered: true,
                actions: outcomes,
            });
        }
        Ok(results)
    }

    fn execute_action(
        &self,
        workflow: &Workflow,
        action: &WorkflowAction,
        trigger_json: &Value,
        response: &FormResponse,
    ) -> Result<Option<String>, ActionError> {
        match action.kind {
            ActionKind::CreateSubForm => {
                let target_form_id = action
                    .target_form_id
                    .as_deref()
                    .ok_or(ActionError::MissingTargetForm)?;
                let now = Utc::now();
                let version = self.catalog.active_version(target_form_id, now)?;

                let mut data = Map::new();
                for (target_path, source) in &action.data_mapping {
                    let value = match source {
                        MappingSource::Path { path } => resolve_path(path, trigger_json),
                        MappingSource::Literal(value) => Some(value.clone()),
                    };
                    if let Some(value) = value {
                        insert_path(&mut data, target_path, value);
                    }
                }

                let assignee = action
                    .assign_to_user_field
                    .as_deref()
                    .and_then(|field| lookup_path(&data, field))
                    .and_then(|value| value.as_str().map(str::to_string));

                let sub = FormResponse {
                    id: Uuid::new_v4().to_string(),
                    form_id: target_form_id.to_string(),
                    version_tag: version.tag.clone(),
                    status: ResponseStatus::Pending,
                    data,
                    assignee,
                    created_at: now,
                    updated_at: now,
                };
                self.responses.save(&sub)?;
                self.responses.append_history(HistoryEntry {
                    comment: Some(format!(
                        "created by workflow '{}' from response '{}'",
                        workflow.id, response.id
                    )),
                    ..HistoryEntry::created(&sub)
                })?;
                Ok(Some(sub.id))
            }
            ActionKind::Notify | ActionKind::AssignTask => {
                let kind = match action.kind {
                    ActionKind::Notify => "notify",
                    _ => "assign_task",
                };
                let message = match &action.message_template {
                    Some(template) => Some(self.renderer.render(template, trigger_json)?),
                    None => None,
                };
                let payload = json!({
                    "response_id": response.id,
                    "form_id": response.form_id,
                    "message": message,
                    "assignee_field": action.assign_to_user_field,
                });
                self.sink.deliver(kind, &payload)?;
                Ok(None)
            }
        }
    }
}

fn trigger_json(response: &FormResponse) -> Value {
    json!({
        "response": flatten_answers(&response.data),
        "form_id": response.form_id,
        "response_id": response.id,
    })
}

fn trigger_context(trigger_json: &Value) -> Context {
    let mut ctx = Context::new();
    if let Some(entries) = trigger_json.as_object() {
        for (key, value) in entries {
            ctx.insert(key, value);
        }
    }
    ctx
}

/// Trigger conditions address answers by question name; flatten the nested
/// section/question mapping so `response['priority']` works regardless of
/// which section collected the answer. Nested values stay reachable under
/// their section keys as well.
fn flatten_answers(data: &Map<String, Value>) -> Value {
    let mut flat = Map::new();
    collect_flat(data, &mut flat);
    for (key, value) in data {
        flat.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Value::Object(flat)
}

fn collect_flat(data: &Map<String, Value>, out: &mut Map<String, Value>) {
    for (key, value) in data {
        match value {
            Value::Object(nested) => collect_flat(nested, out),
            other => {
                out.entry(key.clone()).or_insert_with(|| other.clone());
            }
        }
    }
}

/// Resolves a mapping source path (e.g. `response.ticket.priority` or
/// `response['priority']`) against the trigger context. Only static key and
/// index segments are honored.
fn resolve_path(path: &str, root: &Value) -> Option<Value> {
    let Ok(Expr::Path { segments }) = Expr::parse(path) else {
        return None;
    };
    let mut current = root;
    for segment in &segments {
        current = match segment {
            Segment::Key(key) => current.get(key)?,
            Segment::Index(index) => match index.as_ref() {
                Expr::Literal(Literal::Str(key)) => current.get(key)?,
                Expr::Literal(Literal::Number(position))
                    if position.fract() == 0.0 && *position >= 0.0 =>
                {
                    current.get(*position as usize)?
                }
                _ => return None,
            },
        };
    }
    Some(current.clone())
}

/// Inserts a value at a `/`-separated target path, creating intermediate
/// objects.
fn insert_path(out: &mut Map<String, Value>, path: &str, value: Value) {
    let mut parts = path.split('/').filter(|part| !part.is_empty());
    let Some(first) = parts.next() else {
        return;
    };
    let mut current = out;
    let mut key = first.to_string();
    for part in parts {
        let entry = current
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
        key = part.to_string();
    }
    current.insert(key, value);
}

fn lookup_path<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('/').filter(|part| !part.is_empty());
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}
