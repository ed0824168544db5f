//! RollbackGuard: keeps object storage and the metadata collection from
//! drifting apart.
//!
//! An upload followed by a failed metadata write would otherwise leave an
//! orphaned remote object that no document references. The guard pairs the
//! two steps and compensates: if the metadata write fails, the uploaded
//! object is deleted best-effort and the write's error propagates unchanged.
//! A failed compensation never masks the original error; it is logged and
//! surfaced as a `RollbackFailed` event instead.

use crate::error::Result;
use crate::events::{EventBus, MediaEvent};
use crate::model::{Asset, RemoteRef};
use crate::object_store::ObjectStore;
use crate::transfer::{ProgressFn, TransferCoordinator};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Pairs an upload with its metadata write, undoing the upload when the
/// write fails.
pub struct RollbackGuard {
    objects: Arc<dyn ObjectStore>,
    events: Arc<EventBus>,
}

impl RollbackGuard {
    pub fn new(objects: Arc<dyn ObjectStore>, events: Arc<EventBus>) -> Self {
        Self { objects, events }
    }

    /// Upload the asset's payload, then run `write` with the resulting
    /// reference. If `write` fails, delete the uploaded object and return
    /// the write's error.
    pub async fn upload_with_metadata<T, F, Fut>(
        &self,
        transfer: &TransferCoordinator,
        asset: &Asset,
        cancel: &CancellationToken,
        progress: Option<ProgressFn>,
        write: F,
    ) -> Result<(RemoteRef, T)>
    where
        F: FnOnce(RemoteRef) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let reference = transfer.upload(asset, cancel, progress).await?;

        match write(reference.clone()).await {
            Ok(value) => Ok((reference, value)),
            Err(write_err) => {
                warn!(
                    reference = %reference,
                    error = %write_err,
                    "metadata write failed, rolling back upload"
                );
                if let Err(delete_err) = self.objects.delete(&reference).await {
                    warn!(
                        reference = %reference,
                        error = %delete_err,
                        "rollback delete failed, remote object orphaned"
                    );
                    self.events.emit(MediaEvent::RollbackFailed {
                        reference: reference.to_string(),
                        reason: delete_err.to_string(),
                    });
                }
                Err(write_err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::object_store::InMemoryObjectStore;
    use crate::retry::{RetryConfig, RetryPolicy};
    use crate::transfer::TransferConfig;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    fn transfer(store: Arc<InMemoryObjectStore>) -> TransferCoordinator {
        let retry = RetryPolicy::new(RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            jitter: false,
        });
        TransferCoordinator::new(store, retry, TransferConfig::default())
    }

    async fn asset_with_payload(dir: &Path) -> Asset {
        let path = dir.join("clip.mov");
        tokio::fs::write(&path, b"payload").await.unwrap();
        Asset::new_local("owner-1", "clip.mov", path, 7)
    }

    #[tokio::test]
    async fn test_successful_pair_keeps_object() {
        let store = Arc::new(InMemoryObjectStore::new());
        let guard = RollbackGuard::new(Arc::clone(&store) as _, Arc::new(EventBus::new()));
        let coordinator = transfer(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_payload(dir.path()).await;

        let (reference, doc_id) = guard
            .upload_with_metadata(
                &coordinator,
                &asset,
                &CancellationToken::new(),
                None,
                |reference| async move {
                    assert_eq!(reference.as_str(), "owner-1/clip.mov");
                    Ok("v-1".to_string())
                },
            )
            .await
            .unwrap();

        assert_eq!(doc_id, "v-1");
        assert!(store.contains(&reference));
    }

    #[tokio::test]
    async fn test_failed_write_deletes_uploaded_object() {
        let store = Arc::new(InMemoryObjectStore::new());
        let guard = RollbackGuard::new(Arc::clone(&store) as _, Arc::new(EventBus::new()));
        let coordinator = transfer(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_payload(dir.path()).await;

        let result: Result<(RemoteRef, ())> = guard
            .upload_with_metadata(
                &coordinator,
                &asset,
                &CancellationToken::new(),
                None,
                |_| async { Err(SyncError::QuotaExceeded) },
            )
            .await;

        assert!(matches!(result, Err(SyncError::QuotaExceeded)));
        let reference = RemoteRef::parse("owner-1/clip.mov").unwrap();
        assert!(!store.contains(&reference), "orphaned object rolled back");
    }

    #[tokio::test]
    async fn test_failed_rollback_surfaces_event_not_error() {
        let store = Arc::new(InMemoryObjectStore::new());
        let events = Arc::new(EventBus::new());
        let guard = RollbackGuard::new(Arc::clone(&store) as _, Arc::clone(&events));
        let coordinator = transfer(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_payload(dir.path()).await;

        let rollback_events: Arc<Mutex<Vec<MediaEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rollback_events);
        let _sub = events.subscribe(move |event| {
            if matches!(event, MediaEvent::RollbackFailed { .. }) {
                sink.lock().unwrap().push(event);
            }
        });

        store.inject_delete_error(SyncError::NetworkUnavailable);
        let result: Result<(RemoteRef, ())> = guard
            .upload_with_metadata(
                &coordinator,
                &asset,
                &CancellationToken::new(),
                None,
                |_| async { Err(SyncError::AuthRequired) },
            )
            .await;

        // The write's error wins; the delete failure is reported on the bus.
        assert!(matches!(result, Err(SyncError::AuthRequired)));
        let observed = rollback_events.lock().unwrap();
        assert_eq!(observed.len(), 1);
        match &observed[0] {
            MediaEvent::RollbackFailed { reference, .. } => {
                assert_eq!(reference, "owner-1/clip.mov");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_upload_never_calls_write() {
        let store = Arc::new(InMemoryObjectStore::new());
        let guard = RollbackGuard::new(Arc::clone(&store) as _, Arc::new(EventBus::new()));
        let coordinator = transfer(Arc::clone(&store));
        let asset = Asset::new_local("owner-1", "gone.mov", "/nope/gone.mov".into(), 1);

        let result: Result<(RemoteRef, ())> = guard
            .upload_with_metadata(
                &coordinator,
                &asset,
                &CancellationToken::new(),
                None,
                |_| async { panic!("write must not run when the upload fails") },
            )
            .await;

        assert!(matches!(result, Err(SyncError::LocalFileMissing(_))));
    }
}
