//! Cheap "has this source changed?" check run before every full download.
//!
//! The verdict is advisory. A false `Changed` costs one redundant download
//! (and the fingerprint gate in the pipeline usually catches it); a false
//! `Unchanged` delays an update until the next poll. A failed probe is never
//! read as a change.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::fetch::SourceFetcher;
use crate::sources::SourceDescriptor;
use crate::types::IngestionCheckpoint;

#[derive(Debug)]
pub enum ChangeVerdict {
    /// Fetch and parse. `observed` is the source's modification time, if known.
    Changed { observed: Option<DateTime<Utc>> },
    Unchanged,
    /// Treated as unchanged; the error is handed back for logging.
    ProbeFailed(SyncError),
}

impl ChangeVerdict {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

pub struct ChangeDetector {
    fetcher: Arc<dyn SourceFetcher>,
}

impl ChangeDetector {
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn check(
        &self,
        source: &SourceDescriptor,
        checkpoint: Option<&IngestionCheckpoint>,
    ) -> ChangeVerdict {
        let probe = match self.fetcher.probe(&source.location).await {
            Ok(probe) => probe,
            Err(e) => return ChangeVerdict::ProbeFailed(e),
        };

        let Some(checkpoint) = checkpoint else {
            return ChangeVerdict::Changed {
                observed: probe.last_modified,
            };
        };

        let Some(observed) = probe.last_modified else {
            return ChangeVerdict::ProbeFailed(SyncError::transient(
                source.location.as_str(),
                "source did not report a usable Last-Modified header",
            ));
        };

        match checkpoint.source_modified {
            Some(previous) if observed <= previous => ChangeVerdict::Unchanged,
            _ => ChangeVerdict::Changed {
                observed: Some(observed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::fetch::SourceProbe;
    use crate::sources::SourceFormat;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::time::Duration;
    use url::Url;

    struct ProbeOnly(Result<SourceProbe, String>);

    #[async_trait]
    impl SourceFetcher for ProbeOnly {
        async fn probe(&self, location: &Url) -> Result<SourceProbe> {
            self.0
                .clone()
                .map_err(|m| SyncError::transient(location.as_str(), m))
        }

        async fn fetch(&self, _location: &Url) -> Result<Vec<u8>> {
            unreachable!("change detection never downloads")
        }
    }

    fn source() -> SourceDescriptor {
        SourceDescriptor::new(
            "fedramp-moderate",
            Url::parse("https://example.test/fedramp.xlsx").unwrap(),
            SourceFormat::Spreadsheet,
            Duration::from_secs(60),
        )
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn detector(result: Result<SourceProbe, String>) -> ChangeDetector {
        ChangeDetector::new(Arc::new(ProbeOnly(result)))
    }

    fn checkpoint(day: u32) -> IngestionCheckpoint {
        IngestionCheckpoint {
            source_modified: Some(at(day)),
            content_sha256: None,
        }
    }

    #[tokio::test]
    async fn no_checkpoint_is_changed() {
        let d = detector(Ok(SourceProbe {
            last_modified: None,
        }));
        let verdict = d.check(&source(), None).await;
        assert!(matches!(verdict, ChangeVerdict::Changed { observed: None }));
    }

    #[tokio::test]
    async fn strictly_newer_is_changed() {
        let d = detector(Ok(SourceProbe {
            last_modified: Some(at(5)),
        }));
        let verdict = d.check(&source(), Some(&checkpoint(4))).await;
        match verdict {
            ChangeVerdict::Changed { observed } => assert_eq!(observed, Some(at(5))),
            other => panic!("expected Changed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_or_older_is_unchanged() {
        let same = detector(Ok(SourceProbe {
            last_modified: Some(at(4)),
        }));
        assert!(matches!(
            same.check(&source(), Some(&checkpoint(4))).await,
            ChangeVerdict::Unchanged
        ));

        let older = detector(Ok(SourceProbe {
            last_modified: Some(at(1)),
        }));
        assert!(!older
            .check(&source(), Some(&checkpoint(4)))
            .await
            .is_changed());
    }

    #[tokio::test]
    async fn probe_error_is_not_a_change() {
        let d = detector(Err("connection refused".into()));
        let verdict = d.check(&source(), None).await;
        assert!(!verdict.is_changed());
        match verdict {
            ChangeVerdict::ProbeFailed(e) => assert!(e.is_transient()),
            other => panic!("expected ProbeFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_header_with_checkpoint_fails_probe() {
        let d = detector(Ok(SourceProbe {
            last_modified: None,
        }));
        let verdict = d.check(&source(), Some(&checkpoint(4))).await;
        assert!(matches!(verdict, ChangeVerdict::ProbeFailed(_)));
    }

    #[tokio::test]
    async fn checkpoint_without_timestamp_defers_to_header() {
        let d = detector(Ok(SourceProbe {
            last_modified: Some(at(2)),
        }));
        let fingerprint_only = IngestionCheckpoint {
            source_modified: None,
            content_sha256: Some("abc".into()),
        };
        assert!(d
            .check(&source(), Some(&fingerprint_only))
            .await
            .is_changed());
    }
}
