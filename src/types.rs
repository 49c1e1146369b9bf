//! Normalized control data shared by parsers, the store and the HTTP layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One compliance control within a framework.
///
/// `id` and `name` are never empty once a record leaves a parser or the
/// upload admitter. `id` is unique within its framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub requirements: String,
    #[serde(default)]
    pub guidance: String,
    /// Owning framework id.
    pub framework: String,
    pub last_updated: DateTime<Utc>,
    /// Source fields outside the normalized schema, kept verbatim.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ControlRecord {
    pub fn new(
        framework: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            family: String::new(),
            requirements: String::new(),
            guidance: String::new(),
            framework: framework.into(),
            last_updated: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = family.into();
        self
    }
}

/// Whether a framework comes from the scheduled pipeline or a user upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkType {
    Standard,
    Custom,
}

impl FrameworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Freshness signal recorded after a successful ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionCheckpoint {
    /// `Last-Modified` reported by the source when the cycle started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_modified: Option<DateTime<Utc>>,
    /// Hex SHA-256 of the last ingested payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
}

/// Per-framework summary, updated together with its controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkMetadata {
    pub framework_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub framework_type: FrameworkType,
    pub last_updated: DateTime<Utc>,
    pub control_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<IngestionCheckpoint>,
}

/// Everything one atomic store write needs.
#[derive(Debug, Clone)]
pub struct FrameworkBatch {
    pub framework_id: String,
    pub name: String,
    pub framework_type: FrameworkType,
    pub checkpoint: Option<IngestionCheckpoint>,
    pub records: Vec<ControlRecord>,
}

impl FrameworkBatch {
    pub fn standard(framework_id: impl Into<String>, records: Vec<ControlRecord>) -> Self {
        let framework_id = framework_id.into();
        Self {
            name: framework_id.clone(),
            framework_id,
            framework_type: FrameworkType::Standard,
            checkpoint: None,
            records,
        }
    }

    pub fn custom(
        framework_id: impl Into<String>,
        name: impl Into<String>,
        records: Vec<ControlRecord>,
    ) -> Self {
        Self {
            framework_id: framework_id.into(),
            name: name.into(),
            framework_type: FrameworkType::Custom,
            checkpoint: None,
            records,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: IngestionCheckpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Collapse duplicate ids, keeping the last occurrence in its original
    /// position relative to the other survivors, and stamp every record with
    /// the framework id and the batch timestamp.
    pub fn normalized_records(&self, stamped_at: DateTime<Utc>) -> Vec<ControlRecord> {
        let mut last_index: BTreeMap<&str, usize> = BTreeMap::new();
        for (i, record) in self.records.iter().enumerate() {
            last_index.insert(record.id.as_str(), i);
        }

        self.records
            .iter()
            .enumerate()
            .filter(|(i, record)| last_index.get(record.id.as_str()) == Some(i))
            .map(|(_, record)| ControlRecord {
                framework: self.framework_id.clone(),
                last_updated: stamped_at,
                ..record.clone()
            })
            .collect()
    }
}
