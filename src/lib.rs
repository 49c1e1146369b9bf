//! control-sync - compliance control framework ingestion and synchronization
//!
//! Keeps a local store of security-control frameworks (FedRAMP, NIST SP
//! 800-53, ISO 27001, ...) in step with their authoritative publications, and
//! lets users upload their own control sets alongside them.
//!
//! ## Flow
//! Source registry -> change detection -> fetch -> format parser ->
//! atomic per-framework store batch. The scheduler runs that flow for every
//! registered source on its own interval; the HTTP layer serves reads and
//! custom uploads straight from the store.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use control_sync::{
//!     HttpSourceFetcher, IngestionPipeline, IngestionScheduler, MemoryControlStore,
//!     SourceRegistry,
//! };
//!
//! # async fn run() -> control_sync::Result<()> {
//! let fetcher = Arc::new(HttpSourceFetcher::new(Duration::from_secs(60), "control-sync")?);
//! let pipeline = Arc::new(IngestionPipeline::new(fetcher, Arc::new(MemoryControlStore::new())));
//! let scheduler = IngestionScheduler::new(pipeline, SourceRegistry::builtin(), Duration::from_secs(900));
//! let handle = scheduler.start();
//! // ...
//! handle.shutdown();
//! handle.join().await;
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Shared control data
pub mod types;

// Where frameworks come from and how they are polled
pub mod config;
pub mod sources;

// Ingestion pipeline
pub mod change_detector;
pub mod fetch;
pub mod parsers;
pub mod pipeline;
pub mod scheduler;

// Persistence
pub mod store;

// User-supplied frameworks
pub mod upload;

// REST API (when enabled)
#[cfg(feature = "server")]
pub mod api;

pub use change_detector::{ChangeDetector, ChangeVerdict};
pub use config::ServiceConfig;
pub use error::{Result, StoreError, SyncError};
pub use fetch::{HttpSourceFetcher, SourceFetcher, SourceProbe};
pub use parsers::{parser_for, ControlParser};
pub use pipeline::{CycleMode, CycleOutcome, IngestionPipeline};
pub use scheduler::{IngestionScheduler, SchedulerHandle};
pub use sources::{SourceDescriptor, SourceFormat, SourceRegistry};
pub use store::{ControlStore, MemoryControlStore};
#[cfg(feature = "database")]
pub use store::PgControlStore;
pub use types::{
    ControlRecord, FrameworkBatch, FrameworkMetadata, FrameworkType, IngestionCheckpoint,
};
pub use upload::{AdmittedUpload, CustomUploadAdmitter, UploadMediaType};
