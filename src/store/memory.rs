//! In-process control store.
//!
//! Used when no database is configured, and as the substitutable store in
//! tests. A batch is staged on a copy of the framework entry and swapped in
//! under the write lock, so a failure while staging leaves nothing behind.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::ControlStore;
use crate::error::StoreError;
use crate::types::{ControlRecord, FrameworkBatch, FrameworkMetadata, IngestionCheckpoint};

#[derive(Debug, Clone)]
struct FrameworkEntry {
    metadata: FrameworkMetadata,
    /// Keyed by control id.
    controls: BTreeMap<String, ControlRecord>,
}

#[derive(Debug)]
pub struct MemoryControlStore {
    frameworks: RwLock<BTreeMap<String, FrameworkEntry>>,
    /// Fail the next batch after this many records are staged (`usize::MAX` = off).
    fail_after: AtomicUsize,
    batches_committed: AtomicUsize,
    checkpoint_writes: AtomicUsize,
}

impl Default for MemoryControlStore {
    fn default() -> Self {
        Self {
            frameworks: RwLock::default(),
            fail_after: AtomicUsize::new(usize::MAX),
            batches_committed: AtomicUsize::new(0),
            checkpoint_writes: AtomicUsize::new(0),
        }
    }
}

impl MemoryControlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next batch abort after staging `records` controls.
    pub fn fail_next_batch_after(&self, records: usize) {
        self.fail_after.store(records, Ordering::SeqCst);
    }

    /// Number of batches committed so far.
    pub fn batches_committed(&self) -> usize {
        self.batches_committed.load(Ordering::SeqCst)
    }

    /// Number of metadata-only checkpoint writes so far.
    pub fn checkpoint_writes(&self) -> usize {
        self.checkpoint_writes.load(Ordering::SeqCst)
    }

    /// Total store mutations of either kind.
    pub fn writes(&self) -> usize {
        self.batches_committed() + self.checkpoint_writes()
    }
}

#[async_trait]
impl ControlStore for MemoryControlStore {
    async fn replace_framework_controls(
        &self,
        batch: FrameworkBatch,
    ) -> Result<FrameworkMetadata, StoreError> {
        let now = Utc::now();
        let records = batch.normalized_records(now);
        let fail_after = self.fail_after.swap(usize::MAX, Ordering::SeqCst);

        let mut frameworks = self.frameworks.write().await;

        let mut staged = BTreeMap::new();
        for (i, record) in records.into_iter().enumerate() {
            if i == fail_after {
                return Err(StoreError::BatchAborted {
                    framework_id: batch.framework_id,
                    reason: format!("injected failure after {i} records"),
                });
            }
            staged.insert(record.id.clone(), record);
        }
        if fail_after != usize::MAX && fail_after >= staged.len() {
            return Err(StoreError::BatchAborted {
                framework_id: batch.framework_id,
                reason: "injected failure at commit".into(),
            });
        }

        let metadata = FrameworkMetadata {
            framework_id: batch.framework_id.clone(),
            name: batch.name,
            framework_type: batch.framework_type,
            last_updated: now,
            control_count: staged.len(),
            checkpoint: batch.checkpoint,
        };

        frameworks.insert(
            batch.framework_id,
            FrameworkEntry {
                metadata: metadata.clone(),
                controls: staged,
            },
        );
        self.batches_committed.fetch_add(1, Ordering::SeqCst);

        Ok(metadata)
    }

    async fn read_framework_controls(
        &self,
        framework_id: &str,
    ) -> Result<Vec<ControlRecord>, StoreError> {
        let frameworks = self.frameworks.read().await;
        Ok(frameworks
            .get(framework_id)
            .map(|entry| entry.controls.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn read_all_frameworks(&self) -> Result<Vec<FrameworkMetadata>, StoreError> {
        let frameworks = self.frameworks.read().await;
        Ok(frameworks.values().map(|e| e.metadata.clone()).collect())
    }

    async fn read_framework(
        &self,
        framework_id: &str,
    ) -> Result<Option<FrameworkMetadata>, StoreError> {
        let frameworks = self.frameworks.read().await;
        Ok(frameworks.get(framework_id).map(|e| e.metadata.clone()))
    }

    async fn record_checkpoint(
        &self,
        framework_id: &str,
        checkpoint: IngestionCheckpoint,
    ) -> Result<bool, StoreError> {
        let mut frameworks = self.frameworks.write().await;
        match frameworks.get_mut(framework_id) {
            Some(entry) => {
                entry.metadata.checkpoint = Some(checkpoint);
                self.checkpoint_writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
