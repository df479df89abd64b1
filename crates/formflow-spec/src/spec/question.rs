use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::meta::FieldMeta;

/// Supported answer field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Date,
    Choice,
    MultiChoice,
    Rating,
    Slider,
    MatrixChoice,
    FileUpload,
    /// Presentational only; never carries an answer.
    Image,
}

/// Per-question validation constraint, enforced in final mode only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// One selectable option of a choice-like question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

/// A typed field within a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Question {
    pub name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Overrides the static `required` flag when present; forward references
    /// resolve to undefined and the question stays optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_if: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_if: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    /// Raw per-type metadata as persisted. Unrecognized keys survive
    /// round-trips here; validation only reads the narrowed shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<serde_json::Value>,
}

impl Question {
    /// Narrows `meta_data` into the shape recognized for this field type.
    pub fn meta(&self) -> Option<FieldMeta> {
        FieldMeta::narrow(self.kind, self.meta_data.as_ref())
    }

    pub fn has_choice(&self, value: &str) -> bool {
        self.choices.iter().any(|choice| choice.value == value)
    }
}
