use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use formflow_spec::{Constants, FormCatalog, Mode, NotFoundError, ValidationError, validate};

use crate::history::HistoryEntry;
use crate::response::{FormResponse, ResponseStatus};
use crate::store::{ResponseStore, StorageError};
use crate::workflow::WorkflowEngine;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("response '{0}' is not an editable draft")]
    NotADraft(String),
}

/// Orchestrates draft and final submissions.
///
/// The schema version is resolved exactly once at submission start and held
/// for the submission's lifetime; a concurrent republish never re-targets
/// it. Validation runs strictly before persistence, so nothing malformed is
/// ever stored and a retry after a transient [`StorageError`] simply
/// re-runs the pure validation.
pub struct SubmissionPipeline {
    catalog: Arc<dyn FormCatalog>,
    responses: Arc<dyn ResponseStore>,
    workflows: Option<Arc<WorkflowEngine>>,
}

impl SubmissionPipeline {
    pub fn new(catalog: Arc<dyn FormCatalog>, responses: Arc<dyn ResponseStore>) -> Self {
        SubmissionPipeline {
            catalog,
            responses,
            workflows: None,
        }
    }

    /// Wires the workflow engine in for post-persistence hand-off on final
    /// submissions.
    pub fn with_workflows(mut self, workflows: Arc<WorkflowEngine>) -> Self {
        self.workflows = Some(workflows);
        self
    }

    /// Validates and persists a new submission against the form's currently
    /// active version.
    pub fn submit(
        &self,
        form_id: &str,
        payload: &Value,
        mode: Mode,
        user: Value,
    ) -> Result<FormResponse, SubmitError> {
        let now = Utc::now();
        let version = self.catalog.active_version(form_id, now)?;
        let constants = Constants::new(user, now);
        let validated = validate(&version, payload, mode, &constants)?;

        let response = FormResponse {
            id: Uuid::new_v4().to_string(),
            form_id: form_id.to_string(),
            version_tag: version.tag.clone(),
            status: match mode {
                Mode::Draft => ResponseStatus::Draft,
                Mode::Final => ResponseStatus::Submitted,
            },
            data: validated.cleaned,
            assignee: None,
            created_at: now,
            updated_at: now,
        };
        self.responses.save(&response)?;
        self.responses.append_history(HistoryEntry::created(&response))?;

        if mode == Mode::Final {
            self.hand_off(&response);
        }
        Ok(response)
    }

    /// Re-validates an existing draft against the version it was originally
    /// started under — never against a newer republish — and persists the
    /// update. `Mode::Final` finalizes the draft.
    pub fn resubmit(
        &self,
        response_id: &str,
        payload: &Value,
        mode: Mode,
        user: Value,
    ) -> Result<FormResponse, SubmitError> {
        let existing = self
            .responses
            .get(response_id)?
            .ok_or_else(|| NotFoundError::Response(response_id.to_string()))?;
        if existing.status != ResponseStatus::Draft {
            return Err(SubmitError::NotADraft(response_id.to_string()));
        }

        let now = Utc::now();
        let version = self
            .catalog
            .resolve_version(&existing.form_id, &existing.version_tag)?;
        let constants = Constants::new(user, now);
        let validated = validate(&version, payload, mode, &constants)?;

        let mut updated = existing;
        updated.data = validated.cleaned;
        updated.updated_at = now;
        if mode == Mode::Final {
            updated.status = ResponseStatus::Submitted;
        }
        self.responses.save(&updated)?;
        self.responses.append_history(HistoryEntry::updated(&updated))?;

        if mode == Mode::Final {
            self.hand_off(&updated);
        }
        Ok(updated)
    }

    /// Workflow evaluation runs after persistence and is best-effort: a
    /// buggy workflow can never block or corrupt a legitimate submission.
    fn hand_off(&self, response: &FormResponse) {
        let Some(workflows) = &self.workflows else {
            return;
        };
        if let Err(error) = workflows.evaluate_workflows(&response.id) {
            tracing::warn!(
                response_id = %response.id,
                form_id = %response.form_id,
                %error,
                "workflow evaluation failed"
            );
        }
    }
}
