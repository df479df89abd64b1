use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation strictness. Draft submissions get structural/type checks and
/// hidden-field stripping only; final submissions get the full pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Draft,
    Final,
}

/// Machine-readable issue codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingRequired,
    TypeMismatch,
    MinLength,
    MaxLength,
    PatternMismatch,
    Min,
    Max,
    StepMismatch,
    InvalidOption,
    Cardinality,
    TooManyInstances,
    GlobalRule,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::MissingRequired => "missing_required",
            IssueCode::TypeMismatch => "type_mismatch",
            IssueCode::MinLength => "min_length",
            IssueCode::MaxLength => "max_length",
            IssueCode::PatternMismatch => "pattern_mismatch",
            IssueCode::Min => "min",
            IssueCode::Max => "max",
            IssueCode::StepMismatch => "step_mismatch",
            IssueCode::InvalidOption => "invalid_option",
            IssueCode::Cardinality => "cardinality",
            IssueCode::TooManyInstances => "too_many_instances",
            IssueCode::GlobalRule => "global_rule",
        }
    }
}

/// One structured validation failure, attributed to a payload path such as
/// `contact/email` or `family_members[2]/first_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationIssue {
    pub path: String,
    pub code: IssueCode,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, code: IssueCode, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            code,
            message: message.into(),
        }
    }
}

/// Recoverable validation failure: the caller fixes the listed issues and
/// re-submits. Raised strictly before anything is persisted.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("validation failed with {} issue(s)", .issues.len())]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}
