//! JSON API catalog parser.
//!
//! The response body already is a collection of control objects, either a
//! bare array or `{ "controls": [...] }`. Only field names are normalized.

use serde_json::{Map, Value};

use super::{non_empty, ControlParser};
use crate::error::{Result, SyncError};
use crate::sources::SourceFormat;
use crate::types::ControlRecord;

const ID_KEYS: &[&str] = &["id", "controlId", "control_id", "ControlID"];
const NAME_KEYS: &[&str] = &["name", "title", "Title"];
const DESCRIPTION_KEYS: &[&str] = &["description", "Description"];
const FAMILY_KEYS: &[&str] = &["family", "Family", "category"];
const REQUIREMENTS_KEYS: &[&str] = &["requirements", "Requirements"];
const GUIDANCE_KEYS: &[&str] = &["guidance", "Guidance"];

/// Keys owned by the pipeline; never copied from the source.
const RESERVED_KEYS: &[&str] = &["framework", "lastUpdated"];

#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredApiParser;

impl ControlParser for StructuredApiParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::StructuredApi
    }

    fn parse(&self, framework_id: &str, payload: &[u8]) -> Result<Vec<ControlRecord>> {
        let body: Value = serde_json::from_slice(payload)
            .map_err(|e| SyncError::structural(self.format(), e))?;

        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut object) => match object.remove("controls") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(SyncError::structural(
                        self.format(),
                        "response object has no 'controls' array",
                    ))
                }
            },
            _ => {
                return Err(SyncError::structural(
                    self.format(),
                    "response is neither an array nor an object",
                ))
            }
        };

        let total = items.len();
        let controls: Vec<ControlRecord> = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(object) => normalize(framework_id, object),
                _ => None,
            })
            .collect();

        tracing::debug!(
            framework_id,
            parsed = controls.len(),
            skipped = total - controls.len(),
            "Parsed API catalog"
        );
        Ok(controls)
    }
}

fn normalize(framework_id: &str, mut object: Map<String, Value>) -> Option<ControlRecord> {
    let id = take_field(&mut object, ID_KEYS).and_then(|v| non_empty(&v))?;
    let name = take_field(&mut object, NAME_KEYS).and_then(|v| non_empty(&v))?;

    let mut record = ControlRecord::new(framework_id, id, name);
    record.description = take_field(&mut object, DESCRIPTION_KEYS).unwrap_or_default();
    record.family = take_field(&mut object, FAMILY_KEYS).unwrap_or_default();
    record.requirements = take_field(&mut object, REQUIREMENTS_KEYS).unwrap_or_default();
    record.guidance = take_field(&mut object, GUIDANCE_KEYS).unwrap_or_default();

    for key in RESERVED_KEYS {
        object.remove(*key);
    }
    record.extra = object.into_iter().collect();
    Some(record)
}

/// Remove every alias of a field and return the first usable value.
fn take_field(object: &mut Map<String, Value>, aliases: &[&str]) -> Option<String> {
    let mut found = None;
    for key in aliases {
        if let Some(value) = object.remove(*key) {
            if found.is_none() {
                found = scalar_text(&value);
            }
        }
    }
    found
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
