//! HTTP access to control sources.
//!
//! The pipeline only talks to sources through [`SourceFetcher`], so tests can
//! substitute canned payloads and failures.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::LAST_MODIFIED;
use reqwest::Client;
use url::Url;

use crate::error::{Result, SyncError};

/// Result of a metadata-only request against a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceProbe {
    /// Parsed `Last-Modified` header, when the server sent a valid one.
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Lightweight freshness probe (HEAD).
    async fn probe(&self, location: &Url) -> Result<SourceProbe>;

    /// Full payload download (GET).
    async fn fetch(&self, location: &Url) -> Result<Vec<u8>>;
}

/// reqwest-backed fetcher. Every request is bounded by the client timeout.
pub struct HttpSourceFetcher {
    http: Client,
}

impl HttpSourceFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn probe(&self, location: &Url) -> Result<SourceProbe> {
        let response = self
            .http
            .head(location.clone())
            .send()
            .await
            .map_err(|e| SyncError::transient(location.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::transient(
                location.as_str(),
                format!("HEAD returned {status}"),
            ));
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        Ok(SourceProbe { last_modified })
    }

    async fn fetch(&self, location: &Url) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(location.clone())
            .send()
            .await
            .map_err(|e| SyncError::transient(location.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::transient(
                location.as_str(),
                format!("GET returned {status}"),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::transient(location.as_str(), e))?;

        tracing::debug!(location = %location, bytes = body.len(), "Fetched source payload");
        Ok(body.to_vec())
    }
}

/// Parse an HTTP date (`Last-Modified`). Servers send RFC 1123 / RFC 2822
/// form; a few send RFC 3339.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc1123_last_modified() {
        let parsed = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap());
    }

    #[test]
    fn parses_rfc3339_last_modified() {
        let parsed = parse_http_date("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn garbage_date_is_none() {
        assert!(parse_http_date("yesterday-ish").is_none());
        assert!(parse_http_date("").is_none());
    }
}
