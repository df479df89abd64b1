use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::spec::question::FieldType;

/// Recognized `meta_data` shapes, one per field type that carries metadata.
/// Narrowed from the raw payload at the boundary; extra keys in the raw
/// value are preserved on the question but ignored here.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMeta {
    Rating(RatingMeta),
    Slider(SliderMeta),
    MatrixChoice(MatrixChoiceMeta),
    Image(ImageMeta),
    FileUpload(FileUploadMeta),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RatingMeta {
    #[serde(default = "default_max_stars")]
    pub max_stars: u32,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SliderMeta {
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_step")]
    pub step: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatrixChoiceMeta {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageMeta {
    pub image_url: String,
    #[serde(default)]
    pub alt_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileUploadMeta {
    /// Glob patterns accepted file names must match, e.g. `*.pdf`.
    #[serde(default)]
    pub allowed_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
}

fn default_max_stars() -> u32 {
    5
}

fn default_step() -> f64 {
    1.0
}

impl FieldMeta {
    /// Returns the typed shape for `kind`, or `None` when the field type
    /// carries no metadata or the raw value does not match the recognized
    /// shape. A malformed shape degrades the dependent checks rather than
    /// failing the submission.
    pub fn narrow(kind: FieldType, raw: Option<&Value>) -> Option<FieldMeta> {
        let raw = raw?;
        match kind {
            FieldType::Rating => narrowed(raw).map(FieldMeta::Rating),
            FieldType::Slider => narrowed(raw).map(FieldMeta::Slider),
            FieldType::MatrixChoice => narrowed(raw).map(FieldMeta::MatrixChoice),
            FieldType::Image => narrowed(raw).map(FieldMeta::Image),
            FieldType::FileUpload => narrowed(raw).map(FieldMeta::FileUpload),
            _ => None,
        }
    }
}

fn narrowed<T: serde::de::DeserializeOwned>(raw: &Value) -> Option<T> {
    serde_json::from_value(raw.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slider_meta_narrows_with_default_step() {
        let meta = FieldMeta::narrow(FieldType::Slider, Some(&json!({"min": 0, "max": 10})));
        match meta {
            Some(FieldMeta::Slider(slider)) => {
                assert_eq!(slider.min, 0.0);
                assert_eq!(slider.max, 10.0);
                assert_eq!(slider.step, 1.0);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn extra_keys_are_ignored() {
        let meta = FieldMeta::narrow(
            FieldType::Rating,
            Some(&json!({"max_stars": 3, "icon": "star", "theme": "dark"})),
        );
        assert_eq!(
            meta,
            Some(FieldMeta::Rating(RatingMeta {
                max_stars: 3,
                icon: "star".into()
            }))
        );
    }

    #[test]
    fn mismatched_shape_degrades_to_none() {
        let meta = FieldMeta::narrow(FieldType::Slider, Some(&json!({"min": "low"})));
        assert!(meta.is_none());
        assert!(FieldMeta::narrow(FieldType::Text, Some(&json!({}))).is_none());
    }
}
