//! Shared fixtures for the integration tests: a scriptable fetcher and
//! workbook builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use control_sync::{Result, SourceDescriptor, SourceFetcher, SourceFormat, SourceProbe, SyncError};
use rust_xlsxwriter::Workbook;
use url::Url;

#[derive(Debug, Clone, Default)]
struct FakeSource {
    last_modified: Option<DateTime<Utc>>,
    payload: Vec<u8>,
    probe_error: Option<String>,
    fetch_error: Option<String>,
}

/// In-process [`SourceFetcher`] with per-location canned responses.
///
/// Unknown locations fail both probe and fetch. Fetches can be slowed down
/// to observe overlapping cycles.
#[derive(Default)]
pub struct FakeFetcher {
    sources: Mutex<HashMap<String, FakeSource>>,
    fetch_delay: Mutex<Duration>,
    probes: AtomicUsize,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, location: &Url, last_modified: Option<DateTime<Utc>>, payload: Vec<u8>) {
        self.sources.lock().unwrap().insert(
            location.to_string(),
            FakeSource {
                last_modified,
                payload,
                ..FakeSource::default()
            },
        );
    }

    pub fn set_last_modified(&self, location: &Url, last_modified: Option<DateTime<Utc>>) {
        self.entry(location, |s| s.last_modified = last_modified);
    }

    pub fn set_payload(&self, location: &Url, payload: Vec<u8>) {
        self.entry(location, |s| s.payload = payload);
    }

    pub fn fail_probe(&self, location: &Url, message: &str) {
        self.entry(location, |s| s.probe_error = Some(message.to_string()));
    }

    pub fn fail_fetch(&self, location: &Url, message: &str) {
        self.entry(location, |s| s.fetch_error = Some(message.to_string()));
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn entry(&self, location: &Url, update: impl FnOnce(&mut FakeSource)) {
        let mut sources = self.sources.lock().unwrap();
        update(sources.entry(location.to_string()).or_default());
    }

    fn lookup(&self, location: &Url) -> Option<FakeSource> {
        self.sources.lock().unwrap().get(location.as_str()).cloned()
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn probe(&self, location: &Url) -> Result<SourceProbe> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let source = self
            .lookup(location)
            .ok_or_else(|| SyncError::transient(location.as_str(), "404 Not Found"))?;
        if let Some(message) = source.probe_error {
            return Err(SyncError::transient(location.as_str(), message));
        }
        Ok(SourceProbe {
            last_modified: source.last_modified,
        })
    }

    async fn fetch(&self, location: &Url) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let source = self
            .lookup(location)
            .ok_or_else(|| SyncError::transient(location.as_str(), "404 Not Found"))?;
        match source.fetch_error {
            Some(message) => Err(SyncError::transient(location.as_str(), message)),
            None => Ok(source.payload),
        }
    }
}

pub fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

pub fn source(framework_id: &str, format: SourceFormat, poll_interval: Duration) -> SourceDescriptor {
    let location = url(&format!("https://controls.example.test/{framework_id}"));
    SourceDescriptor::new(framework_id, location, format, poll_interval)
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
}

/// One-sheet workbook from string rows; empty strings leave the cell blank.
pub fn workbook(rows: &[Vec<String>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if !value.is_empty() {
                sheet.write_string(r as u32, c as u16, value).unwrap();
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

/// FedRAMP-style workbook with `count` controls `AC-1..AC-count`, plus
/// `skipped` trailing rows that have a title but no control id.
pub fn fedramp_workbook(count: usize, skipped: usize) -> Vec<u8> {
    let mut rows = vec![vec![
        "ControlID".to_string(),
        "Title".to_string(),
        "Description".to_string(),
        "Family".to_string(),
    ]];
    for i in 1..=count {
        rows.push(vec![
            format!("AC-{i}"),
            format!("Control {i}"),
            format!("Description of control {i}"),
            "Access Control".to_string(),
        ]);
    }
    for i in 0..skipped {
        rows.push(vec![
            String::new(),
            format!("Orphan {i}"),
            String::new(),
            String::new(),
        ]);
    }
    workbook(&rows)
}
