//! One ingestion cycle: change check, fetch, parse, store.
//!
//! Steps run strictly in order. Any error ends the cycle before the store is
//! touched, except a store error, which by construction leaves the previous
//! batch in place.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::Instrument;
use uuid::Uuid;

use crate::change_detector::{ChangeDetector, ChangeVerdict};
use crate::error::{Result, SyncError};
use crate::fetch::SourceFetcher;
use crate::parsers::{parser_for, ControlParser};
use crate::sources::SourceDescriptor;
use crate::store::ControlStore;
use crate::types::{ControlRecord, FrameworkBatch, IngestionCheckpoint};

/// How a finished cycle ended. Errors are reported separately through `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// New control set committed.
    Updated { control_count: usize },
    /// The change detector saw no newer modification time.
    Unchanged,
    /// The probe failed; treated as unchanged.
    ProbeFailed { reason: String },
    /// Payload bytes matched the last ingested fingerprint; only the
    /// checkpoint moved.
    ContentUnchanged,
    /// Parse produced nothing while controls are already stored.
    EmptyParseSkipped { stored: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleMode {
    /// Honour the checkpoint (scheduled polling).
    #[default]
    Scheduled,
    /// Skip change detection and the fingerprint gate.
    Forced,
}

/// Runs ingestion cycles against injected fetcher and store handles.
pub struct IngestionPipeline {
    fetcher: Arc<dyn SourceFetcher>,
    store: Arc<dyn ControlStore>,
    detector: ChangeDetector,
}

impl IngestionPipeline {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, store: Arc<dyn ControlStore>) -> Self {
        Self {
            detector: ChangeDetector::new(Arc::clone(&fetcher)),
            fetcher,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ControlStore> {
        &self.store
    }

    /// Run one scheduled cycle for `source`.
    pub async fn run_cycle(&self, source: &SourceDescriptor) -> Result<CycleOutcome> {
        self.run_cycle_with(source, CycleMode::Scheduled).await
    }

    pub async fn run_cycle_with(
        &self,
        source: &SourceDescriptor,
        mode: CycleMode,
    ) -> Result<CycleOutcome> {
        let span = tracing::info_span!(
            "ingestion_cycle",
            framework_id = %source.framework_id,
            cycle_id = %Uuid::new_v4(),
        );
        self.cycle(source, mode).instrument(span).await
    }

    async fn cycle(&self, source: &SourceDescriptor, mode: CycleMode) -> Result<CycleOutcome> {
        let existing = self.store.read_framework(&source.framework_id).await?;
        let previous = existing.as_ref().and_then(|m| m.checkpoint.clone());

        let observed = match mode {
            CycleMode::Forced => self
                .fetcher
                .probe(&source.location)
                .await
                .ok()
                .and_then(|p| p.last_modified),
            CycleMode::Scheduled => match self.detector.check(source, previous.as_ref()).await {
                ChangeVerdict::Changed { observed } => observed,
                ChangeVerdict::Unchanged => {
                    tracing::debug!("Source unchanged since last ingestion");
                    return Ok(CycleOutcome::Unchanged);
                }
                ChangeVerdict::ProbeFailed(e) => {
                    tracing::warn!(error = %e, "Change probe failed, skipping cycle");
                    return Ok(CycleOutcome::ProbeFailed {
                        reason: e.to_string(),
                    });
                }
            },
        };

        tracing::info!(location = %source.location, "Source changed, fetching");
        let payload = self.fetcher.fetch(&source.location).await?;
        let fingerprint = sha256_hex(&payload);

        let checkpoint = IngestionCheckpoint {
            source_modified: observed.or_else(|| previous.as_ref().and_then(|c| c.source_modified)),
            content_sha256: Some(fingerprint),
        };

        if mode == CycleMode::Scheduled
            && existing.is_some()
            && previous.as_ref().and_then(|c| c.content_sha256.as_ref())
                == checkpoint.content_sha256.as_ref()
        {
            tracing::info!("Payload identical to last ingestion, advancing checkpoint only");
            self.store
                .record_checkpoint(&source.framework_id, checkpoint)
                .await?;
            return Ok(CycleOutcome::ContentUnchanged);
        }

        let parser = parser_for(source.format);
        let records = parse_off_thread(parser, source.framework_id.clone(), payload).await?;

        let stored = existing.as_ref().map(|m| m.control_count).unwrap_or(0);
        if records.is_empty() && stored > 0 {
            tracing::warn!(
                stored,
                "Parse produced no controls, keeping the stored set"
            );
            return Ok(CycleOutcome::EmptyParseSkipped { stored });
        }

        let batch =
            FrameworkBatch::standard(source.framework_id.clone(), records).with_checkpoint(checkpoint);
        let metadata = self.store.replace_framework_controls(batch).await?;

        tracing::info!(
            control_count = metadata.control_count,
            "Stored framework controls"
        );
        Ok(CycleOutcome::Updated {
            control_count: metadata.control_count,
        })
    }
}

/// Workbook decoding is CPU-bound; keep it off the async workers.
async fn parse_off_thread(
    parser: Arc<dyn ControlParser>,
    framework_id: String,
    payload: Vec<u8>,
) -> Result<Vec<ControlRecord>> {
    let format = parser.format();
    tokio::task::spawn_blocking(move || parser.parse(&framework_id, &payload))
        .await
        .map_err(|e| SyncError::structural(format, format!("parser task failed: {e}")))?
}

fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_hex_sha256() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
