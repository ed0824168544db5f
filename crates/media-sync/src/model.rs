//! Data model: local assets with their sync state, and the remote
//! authoritative metadata document.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque asset identifier, stable across devices.
///
/// Shared between the local record and the remote metadata document.
pub type AssetId = String;

/// Scoped object-storage path of the form `{owner}/{name}`.
///
/// The reference itself is stable; authorization is re-validated by the
/// server on every access, so references never need regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRef(String);

impl RemoteRef {
    /// Parse a reference, validating the `{owner}/{name}` shape.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        match raw.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self(raw))
            }
            _ => Err(SyncError::InvalidRemoteReference(raw)),
        }
    }

    /// Build the canonical reference for an asset's payload.
    pub fn for_asset(owner: &str, file_name: &str) -> Result<Self> {
        Self::parse(format!("{owner}/{file_name}"))
    }

    pub fn owner(&self) -> &str {
        // Validated at construction
        self.0.split_once('/').map(|(o, _)| o).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-asset sync bookkeeping attached to the local record.
///
/// Lifecycle: created with `needs_sync = true, remote_id = None`; a confirmed
/// remote write flips to `needs_sync = false, remote_id = Some(..)`.
/// `is_deleted_remotely` is set only from inbound change events, never by
/// local code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub needs_sync: bool,
    pub remote_id: Option<String>,
    /// When the last confirmed remote write happened, ms since epoch.
    pub last_sync_ms: Option<u64>,
    /// The document's `updatedAt` as last observed by this device.
    /// Compared against the remote value for optimistic conflict detection.
    pub last_remote_updated_at: Option<i64>,
    pub is_deleted_remotely: bool,
    /// Bumped on every local mutation.
    pub version: u64,
}

impl SyncState {
    pub fn new() -> Self {
        Self {
            needs_sync: true,
            remote_id: None,
            last_sync_ms: None,
            last_remote_updated_at: None,
            is_deleted_remotely: false,
            version: 0,
        }
    }

    /// Record a local mutation that must be pushed to the backend.
    pub fn mark_dirty(&mut self) {
        self.needs_sync = true;
        self.version += 1;
    }

    /// Record a confirmed remote write.
    pub fn mark_synced(&mut self, remote_id: String, remote_updated_at: i64, now_ms: u64) {
        self.needs_sync = false;
        self.remote_id = Some(remote_id);
        self.last_sync_ms = Some(now_ms);
        self.last_remote_updated_at = Some(remote_updated_at);
    }

    /// Record a soft delete observed from another device.
    pub fn mark_deleted_remotely(&mut self) {
        self.is_deleted_remotely = true;
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

/// One media file: local payload location (if present), remote reference
/// (once uploaded), and sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub owner: String,
    pub file_name: String,
    /// Absent until the payload has been downloaded to this device.
    pub local_path: Option<PathBuf>,
    /// Set only after a successful upload completes.
    pub remote_ref: Option<RemoteRef>,
    pub size_bytes: u64,
    pub sync: SyncState,
}

impl Asset {
    /// A freshly recorded asset awaiting its first sync.
    pub fn new_local(
        owner: impl Into<String>,
        file_name: impl Into<String>,
        local_path: PathBuf,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            file_name: file_name.into(),
            local_path: Some(local_path),
            remote_ref: None,
            size_bytes,
            sync: SyncState::new(),
        }
    }
}

/// The authoritative remote record for an asset, stored in the `videos`
/// collection. Soft-deleted documents keep their row so the deletion itself
/// propagates to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDocument {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub remote_url: String,
    pub thumbnail_url: Option<String>,
    pub is_highlight: bool,
    /// Ms since epoch, assigned at creation and never changed.
    pub created_at: i64,
    /// Ms since epoch, strictly increasing across writes to this document.
    pub updated_at: i64,
    pub is_deleted: bool,
}

/// Caller-settable subset of `VideoDocument` used by metadata writes.
#[derive(Debug, Clone, Default)]
pub struct DocumentFields {
    pub file_name: String,
    pub remote_url: String,
    pub thumbnail_url: Option<String>,
    pub is_highlight: bool,
}

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
