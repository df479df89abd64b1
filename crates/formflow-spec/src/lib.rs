#![allow(missing_docs)]

pub mod answers;
pub mod catalog;
pub mod expr;
pub mod lint;
pub mod progress;
pub mod spec;
pub mod validate;
pub mod visibility;

pub use answers::{IssueCode, Mode, ValidationError, ValidationIssue};
pub use catalog::{FormCatalog, NotFoundError};
pub use expr::{Context, Expr, ExpressionError};
pub use lint::{ConditionIssue, lint_version, lint_workflow};
pub use progress::{Progress, progress};
pub use spec::{
    ActionKind, Choice, Constraint, FieldMeta, FieldType, Form, FormStatus, FormVersion,
    GlobalRule, MappingSource, Question, RepeatPolicy, Section, Workflow, WorkflowAction,
};
pub use validate::{Constants, Validated, validate};
pub use visibility::{VisibilityMap, resolve_visibility};
