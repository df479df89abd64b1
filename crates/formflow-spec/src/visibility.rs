use serde_json::Value;

use crate::answers::Mode;
use crate::spec::FormVersion;
use crate::validate::{Constants, survey};

/// Section/question payload path to its visibility decision.
pub type VisibilityMap = std::collections::BTreeMap<String, bool>;

/// Resolves visibility for every section and question of a version against
/// a payload, using the same top-down document-order pass validation uses.
/// Paths under hidden sections do not appear; they were never evaluated.
pub fn resolve_visibility(
    version: &FormVersion,
    payload: &Value,
    constants: &Constants,
) -> VisibilityMap {
    survey(version, payload, Mode::Draft, constants).visibility
}
