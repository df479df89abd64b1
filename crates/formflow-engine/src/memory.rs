use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use formflow_spec::{Form, FormCatalog, FormVersion, NotFoundError, Workflow};

use crate::history::HistoryEntry;
use crate::response::FormResponse;
use crate::store::{ResponseStore, StorageError, WorkflowStore};

/// Mutex-guarded in-memory implementation of every storage seam, for tests
/// and embedding.
#[derive(Default)]
pub struct InMemoryStore {
    forms: Mutex<BTreeMap<String, Form>>,
    responses: Mutex<BTreeMap<String, FormResponse>>,
    history: Mutex<Vec<HistoryEntry>>,
    workflows: Mutex<Vec<Workflow>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        InMemoryStore::default()
    }

    pub fn insert_form(&self, form: Form) {
        lock(&self.forms).insert(form.id.clone(), form);
    }

    pub fn insert_workflow(&self, workflow: Workflow) {
        lock(&self.workflows).push(workflow);
    }

    pub fn response_count(&self) -> usize {
        lock(&self.responses).len()
    }

    pub fn responses_for(&self, form_id: &str) -> Vec<FormResponse> {
        lock(&self.responses)
            .values()
            .filter(|response| response.form_id == form_id)
            .cloned()
            .collect()
    }
}

impl FormCatalog for InMemoryStore {
    fn active_version(
        &self,
        form_id: &str,
        at: DateTime<Utc>,
    ) -> Result<FormVersion, NotFoundError> {
        let forms = lock(&self.forms);
        let form = forms
            .get(form_id)
            .filter(|form| !form.deleted)
            .ok_or_else(|| NotFoundError::Form(form_id.to_string()))?;
        form.version_active_at(at)
            .cloned()
            .ok_or_else(|| NotFoundError::NoActiveVersion(form_id.to_string()))
    }

    fn resolve_version(&self, form_id: &str, tag: &str) -> Result<FormVersion, NotFoundError> {
        let forms = lock(&self.forms);
        let form = forms
            .get(form_id)
            .filter(|form| !form.deleted)
            .ok_or_else(|| NotFoundError::Form(form_id.to_string()))?;
        form.version(tag).cloned().ok_or_else(|| NotFoundError::Version {
            form_id: form_id.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl ResponseStore for InMemoryStore {
    fn save(&self, response: &FormResponse) -> Result<(), StorageError> {
        lock(&self.responses).insert(response.id.clone(), response.clone());
        Ok(())
    }

    fn get(&self, response_id: &str) -> Result<Option<FormResponse>, StorageError> {
        Ok(lock(&self.responses).get(response_id).cloned())
    }

    fn append_history(&self, entry: HistoryEntry) -> Result<(), StorageError> {
        lock(&self.history).push(entry);
        Ok(())
    }

    fn history(&self, response_id: &str) -> Result<Vec<HistoryEntry>, StorageError> {
        Ok(lock(&self.history)
            .iter()
            .filter(|entry| entry.response_id == response_id)
            .cloned()
            .collect())
    }
}

impl WorkflowStore for InMemoryStore {
    fn active_workflows(&self, trigger_form_id: &str) -> Result<Vec<Workflow>, StorageError> {
        Ok(lock(&self.workflows)
            .iter()
            .filter(|workflow| workflow.active && workflow.trigger_form_id == trigger_form_id)
            .cloned()
            .collect())
    }
}
