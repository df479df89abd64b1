use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::section::Section;

/// Lifecycle state of a form container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    #[default]
    Draft,
    Published,
    Expired,
}

/// Cross-field invariant evaluated after all section-local checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GlobalRule {
    pub name: String,
    /// Sandbox expression over the full answers context; `false` records a
    /// violation against `fields`.
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// Immutable snapshot of a form's section/question schema. Editing a form
/// always appends a new version; responses keep the tag they were validated
/// against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormVersion {
    pub tag: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<GlobalRule>,
}

/// Root container for one data-collection instrument across all its
/// versions. Never hard-deleted; `deleted` is a soft flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Form {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: FormStatus,
    #[serde(default)]
    pub deleted: bool,
    pub versions: Vec<FormVersion>,
}

impl Form {
    /// The version active at `at`: the latest one published at or before
    /// that instant. At most one version satisfies this for any instant.
    pub fn version_active_at(&self, at: DateTime<Utc>) -> Option<&FormVersion> {
        self.versions
            .iter()
            .filter(|version| {
                version
                    .published_at
                    .map(|published| published <= at)
                    .unwrap_or(false)
            })
            .max_by_key(|version| version.published_at)
    }

    pub fn version(&self, tag: &str) -> Option<&FormVersion> {
        self.versions.iter().find(|version| version.tag == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn version(tag: &str, published_hour: Option<u32>) -> FormVersion {
        FormVersion {
            tag: tag.into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            published_at: published_hour
                .map(|hour| Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()),
            sections: vec![],
            rules: vec![],
        }
    }

    #[test]
    fn active_version_is_latest_published_before_instant() {
        let form = Form {
            id: "f".into(),
            title: "F".into(),
            description: None,
            status: FormStatus::Published,
            deleted: false,
            versions: vec![version("v1", Some(1)), version("v2", Some(5)), version("v3", None)],
        };
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        assert_eq!(form.version_active_at(at).unwrap().tag, "v1");
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        assert_eq!(form.version_active_at(later).unwrap().tag, "v2");
    }
}
