//! Source registry: which catalogs are polled, where from, in which format.
//!
//! The registry is fixed at process start. It comes either from the
//! built-in defaults or from a YAML file named by `CONTROL_SYNC_SOURCES`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SyncError};

/// Prefix reserved for frameworks created through custom uploads.
pub const CUSTOM_PREFIX: &str = "custom-";

const DAILY_SECS: u64 = 24 * 60 * 60;

/// Payload format a source publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    Spreadsheet,
    Markup,
    StructuredApi,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spreadsheet => write!(f, "spreadsheet"),
            Self::Markup => write!(f, "markup"),
            Self::StructuredApi => write!(f, "structured-api"),
        }
    }
}

/// One external control catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub framework_id: String,
    pub location: Url,
    pub format: SourceFormat,
    pub poll_interval: Duration,
}

impl SourceDescriptor {
    pub fn new(
        framework_id: impl Into<String>,
        location: Url,
        format: SourceFormat,
        poll_interval: Duration,
    ) -> Self {
        Self {
            framework_id: framework_id.into(),
            location,
            format,
            poll_interval,
        }
    }
}

/// On-disk shape of one registry entry.
#[derive(Debug, Deserialize)]
struct SourceEntry {
    framework_id: String,
    location: String,
    format: SourceFormat,
    #[serde(default = "default_poll_secs")]
    poll_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    sources: Vec<SourceEntry>,
}

fn default_poll_secs() -> u64 {
    DAILY_SECS
}

/// Validated, immutable set of source descriptors.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    /// Build a registry, rejecting duplicate or reserved ids and zero intervals.
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for source in &sources {
            let id = source.framework_id.trim();
            if id.is_empty() {
                return Err(SyncError::Config("source with empty framework_id".into()));
            }
            if id.starts_with(CUSTOM_PREFIX) {
                return Err(SyncError::Config(format!(
                    "framework_id '{id}' uses the reserved '{CUSTOM_PREFIX}' prefix"
                )));
            }
            if source.poll_interval.is_zero() {
                return Err(SyncError::Config(format!(
                    "framework_id '{id}' has a zero poll interval"
                )));
            }
            if !seen.insert(id.to_string()) {
                return Err(SyncError::Config(format!(
                    "duplicate framework_id '{id}'"
                )));
            }
        }
        Ok(Self { sources })
    }

    /// The catalogs the service tracks out of the box.
    pub fn builtin() -> Self {
        let daily = Duration::from_secs(DAILY_SECS);
        let entries = [
            (
                "fedramp-moderate",
                "https://www.fedramp.gov/assets/resources/documents/FedRAMP_Moderate_Security_Controls.xlsx",
                SourceFormat::Spreadsheet,
            ),
            (
                "nist-800-53",
                "https://csrc.nist.gov/publications/detail/sp/800-53/rev-5/final",
                SourceFormat::Markup,
            ),
            (
                "iso-27001",
                "https://www.iso.org/standard/27001",
                SourceFormat::StructuredApi,
            ),
        ];

        let sources = entries
            .into_iter()
            .filter_map(|(id, location, format)| {
                Url::parse(location)
                    .ok()
                    .map(|url| SourceDescriptor::new(id, url, format, daily))
            })
            .collect();
        Self { sources }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(yaml)
            .map_err(|e| SyncError::Config(format!("invalid source registry: {e}")))?;

        let sources = file
            .sources
            .into_iter()
            .map(|entry| {
                let location = Url::parse(&entry.location).map_err(|e| {
                    SyncError::Config(format!(
                        "framework_id '{}' has invalid location '{}': {e}",
                        entry.framework_id, entry.location
                    ))
                })?;
                Ok(SourceDescriptor::new(
                    entry.framework_id.trim(),
                    location,
                    entry.format,
                    Duration::from_secs(entry.poll_interval_secs),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(sources)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read source registry {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn get(&self, framework_id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.framework_id == framework_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_three_daily_sources() {
        let registry = SourceRegistry::builtin();
        assert_eq!(registry.len(), 3);
        let fedramp = registry.get("fedramp-moderate").unwrap();
        assert_eq!(fedramp.format, SourceFormat::Spreadsheet);
        assert_eq!(fedramp.poll_interval, Duration::from_secs(86_400));
        assert_eq!(
            registry.get("nist-800-53").unwrap().format,
            SourceFormat::Markup
        );
        assert_eq!(
            registry.get("iso-27001").unwrap().format,
            SourceFormat::StructuredApi
        );
    }

    #[test]
    fn yaml_registry_parses_formats_and_intervals() {
        let yaml = r#"
sources:
  - framework_id: cis-v8
    location: https://example.test/cis.xlsx
    format: spreadsheet
    poll_interval_secs: 3600
  - framework_id: pci-dss
    location: https://example.test/pci/controls
    format: structured-api
"#;
        let registry = SourceRegistry::from_yaml_str(yaml).unwrap();
        assert_eq!(registry.len(), 2);
        let cis = registry.get("cis-v8").unwrap();
        assert_eq!(cis.poll_interval, Duration::from_secs(3600));
        let pci = registry.get("pci-dss").unwrap();
        assert_eq!(pci.format, SourceFormat::StructuredApi);
        assert_eq!(pci.poll_interval, Duration::from_secs(86_400));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let yaml = r#"
sources:
  - framework_id: cis-v8
    location: https://example.test/a
    format: markup
  - framework_id: cis-v8
    location: https://example.test/b
    format: markup
"#;
        let err = SourceRegistry::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn reserved_prefix_rejected() {
        let yaml = r#"
sources:
  - framework_id: custom-mine
    location: https://example.test/a
    format: markup
"#;
        let err = SourceRegistry::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn bad_location_and_zero_interval_rejected() {
        let bad_url = r#"
sources:
  - framework_id: x
    location: not a url
    format: markup
"#;
        assert!(matches!(
            SourceRegistry::from_yaml_str(bad_url),
            Err(SyncError::Config(_))
        ));

        let zero = r#"
sources:
  - framework_id: x
    location: https://example.test/a
    format: markup
    poll_interval_secs: 0
"#;
        assert!(SourceRegistry::from_yaml_str(zero)
            .unwrap_err()
            .to_string()
            .contains("zero poll interval"));
    }

    #[test]
    fn unknown_format_rejected() {
        let yaml = r#"
sources:
  - framework_id: x
    location: https://example.test/a
    format: pdf
"#;
        assert!(SourceRegistry::from_yaml_str(yaml).is_err());
    }
}
