//! Error types for the ingestion pipeline, the control store and the upload path.
//!
//! `SyncError` is the single error surfaced by pipeline cycles and upload
//! requests. Scheduled cycles log it and move on; the HTTP layer maps it to a
//! status code through [`SyncError::http_status`].

use thiserror::Error;

/// Failures of the persistence layer.
///
/// A `StoreError` always means the batch did not commit: previously stored
/// state for the framework is untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("batch for framework '{framework_id}' aborted: {reason}")]
    BatchAborted {
        framework_id: String,
        reason: String,
    },

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend(e: impl std::fmt::Display) -> Self {
        Self::Backend(e.to_string())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Main error type for ingestion cycles and custom uploads.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network failure, timeout, non-success status or failed probe.
    /// Retried naturally on the next scheduled tick.
    #[error("transient fetch error for {location}: {message}")]
    TransientFetch { location: String, message: String },

    /// Payload could not be opened as its declared format.
    #[error("structural parse error ({format}): {message}")]
    StructuralParse { format: String, message: String },

    /// Uploaded records failed required-field checks.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn transient(location: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::TransientFetch {
            location: location.into(),
            message: message.to_string(),
        }
    }

    pub fn structural(format: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        Self::StructuralParse {
            format: format.to_string(),
            message: message.to_string(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::TransientFetch { .. } => 502,
            Self::StructuralParse { .. } => 400,
            Self::Validation(_) => 400,
            Self::UnsupportedMediaType(_) => 400,
            Self::InvalidInput(_) => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::Config(_) => 500,
            Self::Store(_) => 500,
        }
    }

    /// Transient failures are expected to clear up by themselves on a later cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFetch { .. })
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_by_variant() {
        assert_eq!(SyncError::transient("u", "down").http_status(), 502);
        assert_eq!(SyncError::structural("csv", "bad").http_status(), 400);
        assert_eq!(SyncError::Validation("x".into()).http_status(), 400);
        assert_eq!(
            SyncError::UnsupportedMediaType("image/png".into()).http_status(),
            400
        );
        assert_eq!(SyncError::InvalidInput("x".into()).http_status(), 400);
        assert_eq!(
            SyncError::PayloadTooLarge { size: 2, limit: 1 }.http_status(),
            413
        );
        assert_eq!(
            SyncError::from(StoreError::Backend("boom".into())).http_status(),
            500
        );
    }

    #[test]
    fn display_messages() {
        let e = SyncError::transient("https://example.test/a.xlsx", "timed out");
        assert_eq!(
            e.to_string(),
            "transient fetch error for https://example.test/a.xlsx: timed out"
        );
        assert!(e.is_transient());

        let e = SyncError::from(StoreError::BatchAborted {
            framework_id: "nist-800-53".into(),
            reason: "disk full".into(),
        });
        assert_eq!(
            e.to_string(),
            "batch for framework 'nist-800-53' aborted: disk full"
        );
        assert!(!e.is_transient());
    }
}
