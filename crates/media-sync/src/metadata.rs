//! MetadataSynchronizer: retried writes to the remote `videos` collection
//! with optimistic conflict detection.
//!
//! Conflicts never block a write. When the remote document moved past what
//! this device last observed, the write still lands (last write wins) but
//! the outcome is reported loudly: a warning log, a `ConflictDetected`
//! event, and a `WriteOutcome::ConflictOverwrite` return so callers can
//! reconcile.

use crate::document_store::DocumentStore;
use crate::error::{Result, SyncError};
use crate::events::{EventBus, MediaEvent};
use crate::model::{now_ms, DocumentFields, VideoDocument};
use crate::retry::RetryPolicy;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a metadata write did to the remote document.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// No document existed; one was created.
    Created(VideoDocument),
    /// The document existed and matched our last observation.
    Updated(VideoDocument),
    /// The document had moved past our last observation; our write overwrote
    /// the newer revision.
    ConflictOverwrite {
        written: VideoDocument,
        /// The `updatedAt` of the revision we overwrote.
        remote_updated_at: i64,
    },
}

impl WriteOutcome {
    /// The document as written.
    pub fn document(&self) -> &VideoDocument {
        match self {
            Self::Created(doc) | Self::Updated(doc) => doc,
            Self::ConflictOverwrite { written, .. } => written,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConflictOverwrite { .. })
    }
}

/// Writes and queries asset metadata documents.
pub struct MetadataSynchronizer {
    documents: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
    events: Arc<EventBus>,
}

impl MetadataSynchronizer {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        retry: RetryPolicy,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            documents,
            retry,
            events,
        }
    }

    /// Create or update the document for `id`.
    ///
    /// `last_known_updated_at` is the `updatedAt` this device last observed
    /// (None for a first write). If the stored document is newer, the write
    /// proceeds anyway and the conflict is surfaced in the outcome.
    pub async fn write(
        &self,
        id: &str,
        owner: &str,
        fields: DocumentFields,
        last_known_updated_at: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome> {
        let outcome = self
            .retry
            .run(cancel, |_attempt| {
                let fields = fields.clone();
                async move {
                    let existing = self.documents.get(id).await?;
                    let now = now_ms();

                    let (doc, conflict) = match existing {
                        None => {
                            let doc = VideoDocument {
                                id: id.to_string(),
                                owner_id: owner.to_string(),
                                file_name: fields.file_name,
                                remote_url: fields.remote_url,
                                thumbnail_url: fields.thumbnail_url,
                                is_highlight: fields.is_highlight,
                                created_at: now,
                                updated_at: now,
                                is_deleted: false,
                            };
                            (doc, None)
                        }
                        Some(prev) => {
                            let conflict = match last_known_updated_at {
                                Some(known) if prev.updated_at <= known => None,
                                _ => Some(prev.updated_at),
                            };
                            let doc = VideoDocument {
                                id: prev.id.clone(),
                                owner_id: prev.owner_id.clone(),
                                file_name: fields.file_name,
                                remote_url: fields.remote_url,
                                thumbnail_url: fields.thumbnail_url,
                                is_highlight: fields.is_highlight,
                                created_at: prev.created_at,
                                // Strictly increasing even against clock skew.
                                updated_at: now.max(prev.updated_at + 1),
                                is_deleted: prev.is_deleted,
                            };
                            (doc, conflict)
                        }
                    };

                    self.documents.put(doc.clone()).await?;
                    Ok(match conflict {
                        None if doc.created_at == doc.updated_at => WriteOutcome::Created(doc),
                        None => WriteOutcome::Updated(doc),
                        Some(remote_updated_at) => WriteOutcome::ConflictOverwrite {
                            written: doc,
                            remote_updated_at,
                        },
                    })
                }
            })
            .await?;

        match &outcome {
            WriteOutcome::Created(doc) => {
                info!(document_id = %doc.id, "metadata document created");
            }
            WriteOutcome::Updated(doc) => {
                debug!(document_id = %doc.id, "metadata document updated");
            }
            WriteOutcome::ConflictOverwrite {
                written,
                remote_updated_at,
            } => {
                warn!(
                    document_id = %written.id,
                    remote_updated_at,
                    "overwrote newer remote revision"
                );
                self.events.emit(MediaEvent::ConflictDetected {
                    document_id: written.id.clone(),
                    remote_updated_at: *remote_updated_at,
                });
            }
        }
        Ok(outcome)
    }

    /// Soft-delete the document for `id`: the row stays so the deletion
    /// propagates to subscribed devices. Deleting an already-deleted
    /// document is a no-op.
    pub async fn soft_delete(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        self.retry
            .run(cancel, |_attempt| async move {
                let doc = self
                    .documents
                    .get(id)
                    .await?
                    .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
                if doc.is_deleted {
                    return Ok(());
                }
                let tombstone = VideoDocument {
                    is_deleted: true,
                    updated_at: now_ms().max(doc.updated_at + 1),
                    ..doc
                };
                self.documents.put(tombstone).await
            })
            .await?;
        info!(document_id = %id, "metadata document soft-deleted");
        Ok(())
    }

    /// The owner's live documents, newest first.
    pub async fn query_active(
        &self,
        owner: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<VideoDocument>> {
        self.retry
            .run(cancel, |_attempt| async move {
                self.documents.query(owner, false).await
            })
            .await
    }

    /// All of the owner's documents including tombstones, for full resync.
    pub async fn query_owner(
        &self,
        owner: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<VideoDocument>> {
        self.retry
            .run(cancel, |_attempt| async move {
                self.documents.query(owner, true).await
            })
            .await
    }
}
