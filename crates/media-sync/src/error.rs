//! Error taxonomy for the sync engine.
//!
//! Every error is classified as retryable (transient network conditions,
//! rate limiting) or terminal (bad input, missing auth, exhausted quota).
//! `RetryPolicy` consults this classification; terminal errors surface
//! immediately with zero retries.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Local file missing: {0}")]
    LocalFileMissing(PathBuf),

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String, transient: bool },

    #[error("Download failed: {reason}")]
    DownloadFailed { reason: String, transient: bool },

    #[error("Invalid remote reference: {0}")]
    InvalidRemoteReference(String),

    #[error("Storage quota exceeded")]
    QuotaExceeded,

    #[error("Network unavailable")]
    NetworkUnavailable,

    #[error("Rate limited{}", retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("Authentication required")]
    AuthRequired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{} item(s) failed to sync", failed.len())]
    PartialFailure { failed: Vec<String> },

    #[error("Retries exhausted after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unexpected error: {reason}")]
    Unknown { reason: String, transient: bool },
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::NetworkUnavailable | SyncError::RateLimited { .. } => true,
            SyncError::UploadFailed { transient, .. }
            | SyncError::DownloadFailed { transient, .. }
            | SyncError::Unknown { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Server-supplied backoff hint, if the failure carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Actionable guidance for the user, where one exists.
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            SyncError::AuthRequired => Some("Sign in to your cloud account.".into()),
            SyncError::QuotaExceeded => {
                Some("Free up cloud storage or upgrade your plan.".into())
            }
            SyncError::NetworkUnavailable => {
                Some("Check your connection and try again.".into())
            }
            SyncError::RateLimited { retry_after } => Some(match retry_after {
                Some(d) => format!("Wait {} seconds before retrying.", d.as_secs()),
                None => "Wait a moment before retrying.".into(),
            }),
            SyncError::RetryExhausted { source, .. } => source.recovery_suggestion(),
            _ => None,
        }
    }
}
