//! MediaSyncEngine: the top-level facade wiring transfers, metadata writes,
//! rollback, and inbound change handling together.
//!
//! The engine owns the outbound path (pending local assets to the backend)
//! and the inbound path (remote documents applied to the local store). Both
//! paths speak through the collaborator traits, so hosts swap in their own
//! storage and transport.

use crate::error::{Result, SyncError};
use crate::events::{EventBus, MediaEvent};
use crate::metadata::MetadataSynchronizer;
use crate::model::{now_ms, Asset, DocumentFields, RemoteRef, SyncState, VideoDocument};
use crate::notifier::{ChangeNotifier, LocalAction, PushPayload, VIDEOS_DOCUMENT_TYPE};
use crate::object_store::ObjectStore;
use crate::document_store::DocumentStore;
use crate::local_store::LocalStore;
use crate::push::PushClient;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::rollback::RollbackGuard;
use crate::transfer::{ProgressFn, TransferConfig, TransferCoordinator};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tuning knobs for the engine's transfer and retry behavior.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub transfer: TransferConfig,
}

/// Facade over the full sync pipeline for one device.
pub struct MediaSyncEngine {
    local: Arc<dyn LocalStore>,
    transfer: Arc<TransferCoordinator>,
    metadata: Arc<MetadataSynchronizer>,
    notifier: Arc<ChangeNotifier>,
    rollback: RollbackGuard,
    events: Arc<EventBus>,
}

impl MediaSyncEngine {
    pub fn new(
        local: Arc<dyn LocalStore>,
        objects: Arc<dyn ObjectStore>,
        documents: Arc<dyn DocumentStore>,
        push: Arc<dyn PushClient>,
        config: EngineConfig,
    ) -> Self {
        let events = Arc::new(EventBus::new());
        let retry = RetryPolicy::new(config.retry);
        let transfer = Arc::new(TransferCoordinator::new(
            Arc::clone(&objects),
            retry.clone(),
            config.transfer,
        ));
        let metadata = Arc::new(MetadataSynchronizer::new(
            Arc::clone(&documents),
            retry,
            Arc::clone(&events),
        ));
        let notifier = Arc::new(ChangeNotifier::new(push, documents, Arc::clone(&events)));
        let rollback = RollbackGuard::new(objects, Arc::clone(&events));
        Self {
            local,
            transfer,
            metadata,
            notifier,
            rollback,
            events,
        }
    }

    /// The bus carrying sync milestones for the host application.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Push each pending local asset to the backend: payload upload, then
    /// the paired metadata write under rollback protection.
    ///
    /// Returns how many assets synced. One asset's failure never aborts the
    /// rest; the failures are folded into `SyncError::PartialFailure` at the
    /// end. Cancellation aborts immediately.
    pub async fn sync_pending(&self, owner: &str, cancel: &CancellationToken) -> Result<usize> {
        let pending = self.local.list_pending_sync(owner).await?;
        if pending.is_empty() {
            return Ok(0);
        }
        info!(owner, count = pending.len(), "syncing pending assets");

        let mut failed: Vec<String> = Vec::new();
        let mut synced = 0usize;
        for mut asset in pending {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let write = {
                let metadata = Arc::clone(&self.metadata);
                let id = asset.id.clone();
                let owner = owner.to_string();
                let file_name = asset.file_name.clone();
                let last_known = asset.sync.last_remote_updated_at;
                let cancel = cancel.clone();
                move |reference: RemoteRef| async move {
                    let fields = DocumentFields {
                        file_name,
                        remote_url: reference.to_string(),
                        thumbnail_url: None,
                        is_highlight: false,
                    };
                    metadata.write(&id, &owner, fields, last_known, &cancel).await
                }
            };

            match self
                .rollback
                .upload_with_metadata(&self.transfer, &asset, cancel, None, write)
                .await
            {
                Ok((reference, outcome)) => {
                    let doc = outcome.document();
                    asset.remote_ref = Some(reference);
                    asset
                        .sync
                        .mark_synced(doc.id.clone(), doc.updated_at, now_ms() as u64);
                    self.local.upsert(asset).await?;
                    synced += 1;
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(err) => {
                    warn!(asset_id = %asset.id, error = %err, "asset failed to sync");
                    failed.push(asset.id.clone());
                }
            }
        }

        if failed.is_empty() {
            Ok(synced)
        } else {
            Err(SyncError::PartialFailure { failed })
        }
    }

    /// Start applying remote changes to the local store until cancelled.
    ///
    /// New documents observed by the continuous listener land as placeholder
    /// local records (no payload yet); `fetch_asset` downloads on demand.
    pub fn start_listening(&self, owner: &str, cancel: &CancellationToken) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<VideoDocument>();
        let listener = self
            .notifier
            .listen_continuous(owner, cancel.clone(), move |doc| {
                let _ = tx.send(doc);
            });

        let local = Arc::clone(&self.local);
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            while let Some(doc) = rx.recv().await {
                if let Err(err) = apply_remote_document(local.as_ref(), &events, doc).await {
                    warn!(error = %err, "failed to apply remote document");
                }
            }
            // The sender lives in the listener's callback; the channel
            // closing means the listener already stopped.
            let _ = listener.await;
        })
    }

    /// Pull the owner's full remote state (tombstones included) and apply
    /// it locally. Covers everything a lagged or offline listener missed.
    pub async fn refresh_remote(&self, owner: &str, cancel: &CancellationToken) -> Result<usize> {
        let docs = self.metadata.query_owner(owner, cancel).await?;
        let count = docs.len();
        for doc in docs {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            apply_remote_document(self.local.as_ref(), &self.events, doc).await?;
        }
        info!(owner, count, "remote state refreshed");
        Ok(count)
    }

    /// Download an asset's payload to `target` and record the local path.
    pub async fn fetch_asset(
        &self,
        id: &str,
        target: &Path,
        cancel: &CancellationToken,
        progress: Option<ProgressFn>,
    ) -> Result<Asset> {
        let mut asset = self
            .local
            .get(id)
            .await?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        let reference = asset
            .remote_ref
            .clone()
            .ok_or_else(|| SyncError::NotFound(format!("{id} has no remote payload")))?;

        self.transfer
            .download(&reference, target, cancel, progress)
            .await?;
        asset.local_path = Some(target.to_path_buf());
        self.local.upsert(asset.clone()).await?;
        Ok(asset)
    }

    /// Soft-delete the remote document and drop the local record. The remote
    /// row survives as a tombstone so other devices observe the deletion.
    pub async fn delete_video(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        self.metadata.soft_delete(id, cancel).await?;
        self.local.remove(id).await?;
        Ok(())
    }

    /// Register the owner's videos push subscription (idempotent).
    pub async fn register_push_subscription(&self, owner: &str) -> Result<String> {
        self.notifier
            .register_subscription(VIDEOS_DOCUMENT_TYPE, owner)
            .await
    }

    /// Remove all push subscriptions, e.g. on sign-out.
    pub async fn remove_push_subscriptions(&self) -> Result<()> {
        self.notifier.remove_all_subscriptions().await
    }

    /// Classify an inbound push into the action the host should take.
    pub fn handle_push(&self, payload: PushPayload) -> LocalAction {
        self.notifier.on_push(payload)
    }
}

/// Apply one remote document to the local store.
///
/// Tombstones mark the matching record deleted-remotely; live documents
/// update sync bookkeeping or create a payload-less placeholder record.
async fn apply_remote_document(
    local: &dyn LocalStore,
    events: &EventBus,
    doc: VideoDocument,
) -> Result<()> {
    let existing = local.get(&doc.id).await?;

    if doc.is_deleted {
        if let Some(mut asset) = existing {
            if !asset.sync.is_deleted_remotely {
                asset.sync.mark_deleted_remotely();
                local.upsert(asset).await?;
                events.emit(MediaEvent::RemoteVideoDeleted {
                    document_id: doc.id,
                });
            }
        }
        return Ok(());
    }

    match existing {
        Some(mut asset) => {
            asset.sync.remote_id = Some(doc.id.clone());
            asset.sync.last_remote_updated_at = Some(doc.updated_at);
            local.upsert(asset).await?;
        }
        None => {
            let mut sync = SyncState::new();
            sync.needs_sync = false;
            sync.remote_id = Some(doc.id.clone());
            sync.last_remote_updated_at = Some(doc.updated_at);
            let asset = Asset {
                id: doc.id,
                owner: doc.owner_id,
                file_name: doc.file_name,
                local_path: None,
                remote_ref: RemoteRef::parse(doc.remote_url).ok(),
                size_bytes: 0,
                sync,
            };
            local.upsert(asset).await?;
        }
    }
    Ok(())
}
