pub mod form;
pub mod meta;
pub mod question;
pub mod section;
pub mod workflow;

pub use form::{Form, FormStatus, FormVersion, GlobalRule};
pub use meta::{
    FieldMeta, FileUploadMeta, ImageMeta, MatrixChoiceMeta, RatingMeta, SliderMeta,
};
pub use question::{Choice, Constraint, FieldType, Question};
pub use section::{RepeatPolicy, Section};
pub use workflow::{ActionKind, MappingSource, Workflow, WorkflowAction};
