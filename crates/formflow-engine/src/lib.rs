#![allow(missing_docs)]

pub mod history;
pub mod memory;
pub mod notify;
pub mod pipeline;
pub mod response;
pub mod review;
pub mod store;
pub mod workflow;

pub use history::{HistoryEntry, HistoryKind};
pub use memory::InMemoryStore;
pub use notify::{DeliveryError, MessageRenderer, NotificationSink, RecordingSink};
pub use pipeline::{SubmissionPipeline, SubmitError};
pub use response::{FormResponse, ResponseStatus};
pub use review::{ReviewDecision, ReviewError, apply_review};
pub use store::{ResponseStore, StorageError, WorkflowStore};
pub use workflow::{
    ActionError, ActionOutcome, ActionStatus, IdempotencyLedger, WorkflowEngine, WorkflowError,
    WorkflowExecutionResult,
};
