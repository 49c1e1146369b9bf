//! Service configuration read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::sources::SourceRegistry;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4200";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 900;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Runtime configuration for the ingestion service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    /// Postgres connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// YAML registry file. `None` selects the built-in registry.
    pub sources_path: Option<PathBuf>,
    /// Upper bound on each HEAD/GET against a source.
    pub fetch_timeout: Duration,
    /// Upper bound on one full ingestion cycle.
    pub cycle_timeout: Duration,
    pub max_upload_bytes: usize,
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            sources_path: None,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            cycle_timeout: Duration::from_secs(DEFAULT_CYCLE_TIMEOUT_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            user_agent: default_user_agent(),
        }
    }
}

impl ServiceConfig {
    /// Read configuration from `CONTROL_SYNC_*` and `DATABASE_URL`.
    ///
    /// Unset or unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, fallback: Duration| {
            non_empty(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            bind_addr: non_empty("CONTROL_SYNC_BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: non_empty("DATABASE_URL"),
            sources_path: non_empty("CONTROL_SYNC_SOURCES").map(PathBuf::from),
            fetch_timeout: secs("CONTROL_SYNC_FETCH_TIMEOUT_SECS", defaults.fetch_timeout),
            cycle_timeout: secs("CONTROL_SYNC_CYCLE_TIMEOUT_SECS", defaults.cycle_timeout),
            max_upload_bytes: non_empty("CONTROL_SYNC_MAX_UPLOAD_BYTES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            user_agent: non_empty("CONTROL_SYNC_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }

    /// Load the registry this configuration points at.
    pub fn load_registry(&self) -> Result<SourceRegistry> {
        match &self.sources_path {
            Some(path) => SourceRegistry::from_yaml_file(path),
            None => Ok(SourceRegistry::builtin()),
        }
    }
}

fn default_user_agent() -> String {
    format!("control-sync/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ServiceConfig::from_lookup(lookup(&[]));
        assert_eq!(config.bind_addr, "0.0.0.0:4200");
        assert!(config.database_url.is_none());
        assert!(config.sources_path.is_none());
        assert_eq!(config.fetch_timeout, Duration::from_secs(60));
        assert_eq!(config.cycle_timeout, Duration::from_secs(900));
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert!(config.user_agent.starts_with("control-sync/"));
    }

    #[test]
    fn overrides_and_bad_values() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("CONTROL_SYNC_BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgresql://localhost/controls"),
            ("CONTROL_SYNC_FETCH_TIMEOUT_SECS", "15"),
            ("CONTROL_SYNC_CYCLE_TIMEOUT_SECS", "soon"),
            ("CONTROL_SYNC_MAX_UPLOAD_BYTES", "1024"),
        ]));
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgresql://localhost/controls")
        );
        assert_eq!(config.fetch_timeout, Duration::from_secs(15));
        assert_eq!(config.cycle_timeout, Duration::from_secs(900));
        assert_eq!(config.max_upload_bytes, 1024);
    }

    #[test]
    fn empty_database_url_means_memory_store() {
        let config = ServiceConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")]));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn registry_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "sources:\n  - framework_id: cis-v8\n    location: https://example.test/cis\n    format: markup"
        )
        .unwrap();

        let config = ServiceConfig {
            sources_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let registry = config.load_registry().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("cis-v8").is_some());
    }
}
