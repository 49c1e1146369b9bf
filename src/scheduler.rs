//! IngestionScheduler: one long-lived polling task per registered source.
//!
//! Each task runs a cycle immediately, then once per `poll_interval`, until
//! the shutdown signal flips. A task awaits its own cycle before it waits for
//! the next tick, so cycles of the same framework never overlap; a slow cycle
//! delays its next tick instead of doubling up. Tasks of different frameworks
//! are independent of each other.
//!
//! Cycle failures are logged and swallowed: the next tick simply tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::pipeline::{CycleOutcome, IngestionPipeline};
use crate::sources::{SourceDescriptor, SourceRegistry};

pub struct IngestionScheduler {
    pipeline: Arc<IngestionPipeline>,
    registry: SourceRegistry,
    cycle_timeout: Duration,
}

/// Running scheduler tasks plus the means to stop them.
///
/// Dropping the handle detaches the tasks: they keep polling until the
/// runtime shuts down. Call [`SchedulerHandle::shutdown`] to stop them.
#[must_use = "dropping the handle detaches the source tasks; keep it to shut them down"]
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl SchedulerHandle {
    /// Ask every source task to stop. In-flight cycles are cancelled at
    /// their next await point; batches are atomic, so nothing half-written
    /// remains.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Framework ids with a running task.
    pub fn framework_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Wait for all source tasks to finish.
    pub async fn join(self) {
        for (framework_id, task) in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(framework_id = %framework_id, error = ?e, "Source task panicked");
            }
        }
    }
}

impl IngestionScheduler {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        registry: SourceRegistry,
        cycle_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            registry,
            cycle_timeout,
        }
    }

    /// Spawn one task per source and return immediately.
    pub fn start(&self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = self
            .registry
            .iter()
            .map(|source| {
                let worker = SourceWorker {
                    pipeline: Arc::clone(&self.pipeline),
                    source: source.clone(),
                    cycle_timeout: self.cycle_timeout,
                };
                let handle = tokio::spawn(worker.run(shutdown_rx.clone()));
                (source.framework_id.clone(), handle)
            })
            .collect::<Vec<_>>();

        tracing::info!(sources = tasks.len(), "IngestionScheduler started");
        SchedulerHandle { shutdown_tx, tasks }
    }
}

struct SourceWorker {
    pipeline: Arc<IngestionPipeline>,
    source: SourceDescriptor,
    cycle_timeout: Duration,
}

impl SourceWorker {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let framework_id = self.source.framework_id.as_str();
        tracing::info!(
            framework_id,
            format = %self.source.format,
            poll_interval_secs = self.source.poll_interval.as_secs(),
            "Source polling started"
        );

        let mut ticker = interval(self.source.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // A closed channel (handle dropped) disables the shutdown arm.
            let stop = tokio::select! {
                _ = ticker.tick() => false,
                Ok(()) = shutdown_rx.changed() => true,
            };
            if stop || *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                result = timeout(self.cycle_timeout, self.pipeline.run_cycle(&self.source)) => {
                    self.report(result);
                }
                Ok(()) = shutdown_rx.changed() => {
                    tracing::info!(framework_id, "In-flight cycle cancelled by shutdown");
                    break;
                }
            }
        }

        tracing::info!(framework_id, "Source polling stopped");
    }

    fn report(
        &self,
        result: Result<crate::error::Result<CycleOutcome>, tokio::time::error::Elapsed>,
    ) {
        let framework_id = self.source.framework_id.as_str();
        match result {
            Ok(Ok(CycleOutcome::Updated { control_count })) => {
                tracing::info!(framework_id, control_count, "Ingestion cycle stored controls");
            }
            Ok(Ok(outcome)) => {
                tracing::debug!(framework_id, ?outcome, "Ingestion cycle finished");
            }
            Ok(Err(e)) => {
                tracing::error!(
                    framework_id,
                    error = %e,
                    transient = e.is_transient(),
                    "Ingestion cycle failed, retrying next interval"
                );
            }
            Err(_) => {
                tracing::error!(
                    framework_id,
                    timeout_secs = self.cycle_timeout.as_secs(),
                    "Ingestion cycle timed out, retrying next interval"
                );
            }
        }
    }
}
