//! CustomUploadAdmitter: admits a user-supplied control set as a framework.
//!
//! Unlike scheduled ingestion, which drops bad rows, an upload is all or
//! nothing: one invalid record rejects the whole file and the store is not
//! touched.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};
use crate::sources::CUSTOM_PREFIX;
use crate::store::ControlStore;
use crate::types::{ControlRecord, FrameworkBatch};

/// Declared encoding of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMediaType {
    /// `application/json`: top-level array of control objects.
    Structured,
    /// `text/csv`: header row plus comma-delimited data rows.
    Tabular,
}

impl UploadMediaType {
    /// Resolve from the part's content type, falling back to the file
    /// extension when the client sent none (or a generic one).
    pub fn resolve(content_type: Option<&str>, file_name: Option<&str>) -> Result<Self> {
        let essence = content_type
            .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty());

        match essence.as_deref() {
            Some("application/json") => return Ok(Self::Structured),
            Some("text/csv") => return Ok(Self::Tabular),
            Some("application/octet-stream") | None => {}
            Some(other) => return Err(SyncError::UnsupportedMediaType(other.to_string())),
        }

        let extension = file_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("json") => Ok(Self::Structured),
            Some("csv") => Ok(Self::Tabular),
            _ => Err(SyncError::UnsupportedMediaType(
                essence.unwrap_or_else(|| "unknown".to_string()),
            )),
        }
    }
}

/// What the caller gets back after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedUpload {
    pub framework_id: String,
    pub control_count: usize,
}

pub struct CustomUploadAdmitter {
    store: Arc<dyn ControlStore>,
    max_upload_bytes: usize,
}

impl CustomUploadAdmitter {
    pub fn new(store: Arc<dyn ControlStore>, max_upload_bytes: usize) -> Self {
        Self {
            store,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn admit(
        &self,
        payload: &[u8],
        media_type: UploadMediaType,
        framework_name: &str,
    ) -> Result<AdmittedUpload> {
        if payload.len() > self.max_upload_bytes {
            return Err(SyncError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_upload_bytes,
            });
        }

        let framework_id = custom_framework_id(framework_name)?;

        let objects = match media_type {
            UploadMediaType::Structured => parse_structured(payload)?,
            UploadMediaType::Tabular => parse_tabular(payload)?,
        };
        let records = validate(&framework_id, objects)?;

        let batch = FrameworkBatch::custom(framework_id.clone(), framework_name.trim(), records);
        let metadata = self.store.replace_framework_controls(batch).await?;

        tracing::info!(
            framework_id = %framework_id,
            control_count = metadata.control_count,
            "Admitted custom control upload"
        );

        Ok(AdmittedUpload {
            framework_id,
            control_count: metadata.control_count,
        })
    }
}

/// `custom-` + lower-cased name with whitespace runs collapsed to `-`.
pub fn custom_framework_id(framework_name: &str) -> Result<String> {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));

    let name = framework_name.trim();
    if name.is_empty() {
        return Err(SyncError::InvalidInput(
            "framework name must not be empty".into(),
        ));
    }
    if name.contains('\0') {
        return Err(SyncError::InvalidInput(
            "framework name contains a NUL character".into(),
        ));
    }
    let slug = whitespace.replace_all(&name.to_lowercase(), "-").into_owned();
    Ok(format!("{CUSTOM_PREFIX}{slug}"))
}

fn parse_structured(payload: &[u8]) -> Result<Vec<Value>> {
    let body: Value = serde_json::from_slice(payload)
        .map_err(|e| SyncError::Validation(format!("invalid JSON: {e}")))?;
    match body {
        Value::Array(items) => Ok(items),
        _ => Err(SyncError::Validation(
            "expected a top-level array of controls".into(),
        )),
    }
}

/// Header row names the fields; quoting is not interpreted, missing
/// trailing values become empty strings and blank lines are skipped.
fn parse_tabular(payload: &[u8]) -> Result<Vec<Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(payload);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| SyncError::Validation(format!("unreadable CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result
            .map_err(|e| SyncError::Validation(format!("unreadable CSV row {}: {e}", line + 2)))?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let object: Map<String, Value> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = record.get(i).unwrap_or_default();
                (header.clone(), Value::String(value.to_string()))
            })
            .collect();
        rows.push(Value::Object(object));
    }
    Ok(rows)
}

fn required_string(object: &Map<String, Value>, field: &str) -> Option<String> {
    match object.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn optional_string(object: &mut Map<String, Value>, field: &str) -> String {
    match object.remove(field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Stored text columns and JSON documents cannot carry U+0000.
fn contains_nul(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\0'),
        Value::Array(items) => items.iter().any(contains_nul),
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.contains('\0') || contains_nul(value)),
        _ => false,
    }
}

/// Every object needs non-empty string `id`, `name` and `description`.
/// The first failure rejects the whole set.
fn validate(framework_id: &str, objects: Vec<Value>) -> Result<Vec<ControlRecord>> {
    if objects.is_empty() {
        return Err(SyncError::Validation("upload contains no controls".into()));
    }

    objects
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::Object(mut object) = item else {
                return Err(SyncError::Validation(format!(
                    "control #{} is not an object",
                    index + 1
                )));
            };

            if object.iter().any(|(key, value)| key.contains('\0') || contains_nul(value)) {
                return Err(SyncError::Validation(format!(
                    "control #{} contains a NUL character",
                    index + 1
                )));
            }

            let missing: Vec<&str> = ["id", "name", "description"]
                .into_iter()
                .filter(|field| required_string(&object, field).is_none())
                .collect();
            if !missing.is_empty() {
                return Err(SyncError::Validation(format!(
                    "control #{} is missing non-empty string field(s): {}",
                    index + 1,
                    missing.join(", ")
                )));
            }

            let mut record = ControlRecord::new(
                framework_id,
                optional_string(&mut object, "id"),
                optional_string(&mut object, "name"),
            );
            record.description = optional_string(&mut object, "description");
            record.family = optional_string(&mut object, "family");
            record.requirements = optional_string(&mut object, "requirements");
            record.guidance = optional_string(&mut object, "guidance");
            object.remove("framework");
            object.remove("lastUpdated");
            record.extra = object.into_iter().collect();
            Ok(record)
        })
        .collect()
}
