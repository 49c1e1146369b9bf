//! Control persistence.
//!
//! The store exclusively owns persisted framework state. Writers (the
//! ingestion pipeline and the upload admitter) go through
//! [`ControlStore::replace_framework_controls`], which commits a framework's
//! metadata and its full control set as one atomic batch: readers see either
//! the old set or the new one, and `control_count` always equals the number
//! of stored controls.

mod memory;
#[cfg(feature = "database")]
mod postgres;

pub use memory::MemoryControlStore;
#[cfg(feature = "database")]
pub use postgres::PgControlStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{ControlRecord, FrameworkBatch, FrameworkMetadata, IngestionCheckpoint};

#[async_trait]
pub trait ControlStore: Send + Sync {
    /// Atomically replace a framework's metadata and control set.
    ///
    /// Duplicate ids in the batch collapse to the last occurrence. Every
    /// stored record gets the batch timestamp as `last_updated`.
    async fn replace_framework_controls(
        &self,
        batch: FrameworkBatch,
    ) -> Result<FrameworkMetadata, StoreError>;

    /// All controls of a framework; empty when the framework is unknown.
    async fn read_framework_controls(
        &self,
        framework_id: &str,
    ) -> Result<Vec<ControlRecord>, StoreError>;

    async fn read_all_frameworks(&self) -> Result<Vec<FrameworkMetadata>, StoreError>;

    async fn read_framework(
        &self,
        framework_id: &str,
    ) -> Result<Option<FrameworkMetadata>, StoreError>;

    /// Update only the checkpoint of an existing framework. Returns `false`
    /// when the framework does not exist.
    async fn record_checkpoint(
        &self,
        framework_id: &str,
        checkpoint: IngestionCheckpoint,
    ) -> Result<bool, StoreError>;
}
