use serde_json::Value;

use crate::answers::Mode;
use crate::spec::FormVersion;
use crate::validate::{Constants, survey};

/// Completion counters over the currently visible questions of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

impl Progress {
    pub fn complete(&self) -> bool {
        self.answered >= self.total
    }
}

/// Counts answered and total visible questions for a (possibly partial)
/// payload. Hidden questions and presentational elements are not counted.
pub fn progress(version: &FormVersion, payload: &Value, constants: &Constants) -> Progress {
    let survey = survey(version, payload, Mode::Draft, constants);
    Progress {
        answered: survey.answered,
        total: survey.total,
    }
}
