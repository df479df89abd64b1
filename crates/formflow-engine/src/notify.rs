use std::sync::Mutex;

use handlebars::Handlebars;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Opaque emission target for `notify`/`assign_task` actions. The engine
/// records intent; delivery guarantees live entirely with the collaborator.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, kind: &str, payload: &Value) -> Result<(), DeliveryError>;
}

/// Sink that records emissions, for tests and local embedding.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    pub fn new() -> RecordingSink {
        RecordingSink::default()
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, kind: &str, payload: &Value) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((kind.to_string(), payload.clone()));
        Ok(())
    }
}

/// Renders notification message bodies from the trigger context.
pub struct MessageRenderer {
    registry: Handlebars<'static>,
}

impl MessageRenderer {
    pub fn new() -> MessageRenderer {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        MessageRenderer { registry }
    }

    pub fn render(
        &self,
        template: &str,
        context: &Value,
    ) -> Result<String, handlebars::RenderError> {
        self.registry.render_template(template, context)
    }
}

impl Default for MessageRenderer {
    fn default() -> MessageRenderer {
        MessageRenderer::new()
    }
}
