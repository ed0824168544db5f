//! TransferCoordinator: streamed uploads/downloads with bounded concurrency,
//! throttled progress reporting, and cooperative cancellation.
//!
//! Payloads move as chunk streams, so a transfer never holds a whole file in
//! memory. Progress handlers receive values in `[0.0, 1.0]`, monotonically
//! non-decreasing, with the `0.0` and `1.0` boundary events always delivered
//! and intermediate updates throttled. Cancellation is observed before heavy
//! work and at every chunk boundary; a cancelled or failed download removes
//! its partially written file.

use crate::error::{Result, SyncError};
use crate::model::{Asset, AssetId, RemoteRef};
use crate::object_store::{ByteStream, ObjectStore};
use crate::retry::RetryPolicy;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress callback receiving a completed fraction in `[0.0, 1.0]`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Configuration for transfer behavior.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Concurrency ceiling for batch transfers.
    pub max_concurrent: usize,
    /// Read/write chunk size in bytes.
    pub chunk_size: usize,
    /// Minimum interval between intermediate progress events. The boundary
    /// `0.0` and `1.0` events are never throttled.
    pub progress_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            chunk_size: 64 * 1024,
            progress_interval: Duration::from_millis(50),
        }
    }
}

/// Uploads and downloads asset payloads against an object store.
#[derive(Clone)]
pub struct TransferCoordinator {
    objects: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    config: TransferConfig,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

#[derive(Clone, Copy)]
enum TransferKind {
    Upload,
    Download,
}

/// Removes its key from the in-flight registry on drop, so a transfer slot
/// is released on every exit path.
struct InFlightGuard {
    registry: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.lock().unwrap().remove(&self.key);
    }
}

impl TransferCoordinator {
    pub fn new(objects: Arc<dyn ObjectStore>, retry: RetryPolicy, config: TransferConfig) -> Self {
        Self {
            objects,
            retry,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim the per-asset transfer slot. At most one transfer per key may be
    /// in flight at any instant.
    fn claim(&self, key: String, kind: TransferKind) -> Result<InFlightGuard> {
        let mut registry = self.in_flight.lock().unwrap();
        if !registry.insert(key.clone()) {
            let reason = format!("transfer already in flight for {key}");
            return Err(match kind {
                TransferKind::Upload => SyncError::UploadFailed {
                    reason,
                    transient: false,
                },
                TransferKind::Download => SyncError::DownloadFailed {
                    reason,
                    transient: false,
                },
            });
        }
        Ok(InFlightGuard {
            registry: Arc::clone(&self.in_flight),
            key,
        })
    }

    /// Stream the asset's local payload to object storage and return the
    /// remote reference for the paired metadata write.
    ///
    /// Each retry attempt reopens the file; progress never moves backwards
    /// across attempts.
    pub async fn upload(
        &self,
        asset: &Asset,
        cancel: &CancellationToken,
        progress: Option<ProgressFn>,
    ) -> Result<RemoteRef> {
        let local_path = asset
            .local_path
            .clone()
            .ok_or_else(|| SyncError::LocalFileMissing(PathBuf::from(&asset.file_name)))?;
        let _guard = self.claim(asset.id.clone(), TransferKind::Upload)?;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let reference = RemoteRef::for_asset(&asset.owner, &asset.file_name)?;
        let reporter = ProgressReporter::shared(progress, self.config.progress_interval);
        ProgressReporter::start(&reporter);
        debug!(asset_id = %asset.id, reference = %reference, "upload started");

        let chunk_size = self.config.chunk_size;
        let result = self
            .retry
            .run(cancel, |_attempt| {
                let local_path = local_path.clone();
                let reference = reference.clone();
                let reporter = Arc::clone(&reporter);
                let cancel = cancel.clone();
                async move {
                    let file = tokio::fs::File::open(&local_path).await.map_err(|e| {
                        if e.kind() == std::io::ErrorKind::NotFound {
                            SyncError::LocalFileMissing(local_path.clone())
                        } else {
                            SyncError::UploadFailed {
                                reason: e.to_string(),
                                transient: false,
                            }
                        }
                    })?;
                    let total = file
                        .metadata()
                        .await
                        .map(|m| m.len())
                        .map_err(|e| SyncError::UploadFailed {
                            reason: e.to_string(),
                            transient: false,
                        })?;
                    let data = chunk_stream(file, chunk_size, cancel, reporter, total);
                    self.objects.put(&reference, data, total).await
                }
            })
            .await;

        match result {
            Ok(()) => {
                ProgressReporter::finish(&reporter);
                info!(asset_id = %asset.id, reference = %reference, "upload complete");
                Ok(reference)
            }
            Err(err) => {
                warn!(asset_id = %asset.id, error = %err, "upload failed");
                Err(err)
            }
        }
    }

    /// Stream remote bytes to `target`. On failure or cancellation the
    /// partially written file is removed.
    pub async fn download(
        &self,
        reference: &RemoteRef,
        target: &Path,
        cancel: &CancellationToken,
        progress: Option<ProgressFn>,
    ) -> Result<()> {
        let _guard = self.claim(reference.as_str().to_string(), TransferKind::Download)?;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let reporter = ProgressReporter::shared(progress, self.config.progress_interval);
        ProgressReporter::start(&reporter);
        debug!(reference = %reference, target = %target.display(), "download started");

        let result = self
            .retry
            .run(cancel, |_attempt| {
                let reference = reference.clone();
                let target = target.to_path_buf();
                let cancel = cancel.clone();
                let reporter = Arc::clone(&reporter);
                async move {
                    match self
                        .download_attempt(&reference, &target, &cancel, &reporter)
                        .await
                    {
                        Ok(()) => Ok(()),
                        Err(err) => {
                            let _ = tokio::fs::remove_file(&target).await;
                            Err(err)
                        }
                    }
                }
            })
            .await;

        match result {
            Ok(()) => {
                ProgressReporter::finish(&reporter);
                info!(reference = %reference, "download complete");
                Ok(())
            }
            Err(err) => {
                warn!(reference = %reference, error = %err, "download failed");
                Err(err)
            }
        }
    }

    async fn download_attempt(
        &self,
        reference: &RemoteRef,
        target: &Path,
        cancel: &CancellationToken,
        reporter: &SharedReporter,
    ) -> Result<()> {
        let (mut data, total) = self.objects.get(reference).await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::DownloadFailed {
                    reason: e.to_string(),
                    transient: false,
                })?;
        }
        let mut file =
            tokio::fs::File::create(target)
                .await
                .map_err(|e| SyncError::DownloadFailed {
                    reason: e.to_string(),
                    transient: false,
                })?;

        let mut received: u64 = 0;
        while let Some(chunk) = data.next().await {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let bytes = chunk.map_err(|e| SyncError::DownloadFailed {
                reason: e.to_string(),
                transient: true,
            })?;
            file.write_all(&bytes)
                .await
                .map_err(|e| SyncError::DownloadFailed {
                    reason: e.to_string(),
                    transient: false,
                })?;
            received += bytes.len() as u64;
            if total > 0 {
                ProgressReporter::update(reporter, received as f64 / total as f64);
            }
        }
        file.flush().await.map_err(|e| SyncError::DownloadFailed {
            reason: e.to_string(),
            transient: false,
        })?;
        Ok(())
    }

    /// Upload a batch with a bounded worker pool: up to `max_concurrent`
    /// transfers run at once, and each completion dequeues the next pending
    /// item. One item's failure never aborts its siblings.
    pub async fn upload_batch(
        &self,
        assets: &[Asset],
        cancel: &CancellationToken,
    ) -> Vec<(AssetId, Result<RemoteRef>)> {
        stream::iter(assets.to_vec())
            .map(|asset| {
                let cancel = cancel.clone();
                async move { (asset.id.clone(), self.upload(&asset, &cancel, None).await) }
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await
    }
}

/// Ids of the failed items in a batch result.
pub fn failed_ids(results: &[(AssetId, Result<RemoteRef>)]) -> Vec<AssetId> {
    results
        .iter()
        .filter(|(_, r)| r.is_err())
        .map(|(id, _)| id.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

type SharedReporter = Arc<Mutex<ProgressReporter>>;

/// Throttled, monotonic progress emitter. `high_water` tracks the last
/// emitted value so progress never moves backwards, even when a retry
/// restarts the payload stream from the beginning.
struct ProgressReporter {
    handler: Option<ProgressFn>,
    interval: Duration,
    last_emit: Option<tokio::time::Instant>,
    high_water: f64,
}

impl ProgressReporter {
    fn shared(handler: Option<ProgressFn>, interval: Duration) -> SharedReporter {
        Arc::new(Mutex::new(Self {
            handler,
            interval,
            last_emit: None,
            high_water: -1.0,
        }))
    }

    /// Emit the initial `0.0` boundary event.
    fn start(this: &SharedReporter) {
        this.lock().unwrap().emit(0.0);
    }

    /// Emit an intermediate value, throttled and clamped to be monotonic.
    fn update(this: &SharedReporter, fraction: f64) {
        let mut reporter = this.lock().unwrap();
        let fraction = fraction.clamp(0.0, 1.0).max(reporter.high_water);
        if let Some(last) = reporter.last_emit {
            if last.elapsed() < reporter.interval {
                return;
            }
        }
        reporter.emit(fraction);
    }

    /// Emit the terminal `1.0` boundary event; never throttled.
    fn finish(this: &SharedReporter) {
        let mut reporter = this.lock().unwrap();
        if reporter.high_water < 1.0 {
            reporter.emit(1.0);
        }
    }

    fn emit(&mut self, fraction: f64) {
        if let Some(handler) = &self.handler {
            handler(fraction);
        }
        self.high_water = fraction;
        self.last_emit = Some(tokio::time::Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Chunked file stream
// ---------------------------------------------------------------------------

struct ChunkState {
    file: tokio::fs::File,
    chunk_size: usize,
    cancel: CancellationToken,
    reporter: SharedReporter,
    total: u64,
    sent: u64,
    done: bool,
}

/// Read a file as a chunk stream, reporting progress per chunk and checking
/// cancellation at every chunk boundary.
fn chunk_stream(
    file: tokio::fs::File,
    chunk_size: usize,
    cancel: CancellationToken,
    reporter: SharedReporter,
    total: u64,
) -> ByteStream {
    let state = ChunkState {
        file,
        chunk_size,
        cancel,
        reporter,
        total,
        sent: 0,
        done: false,
    };
    stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        if st.cancel.is_cancelled() {
            st.done = true;
            return Some((
                Err(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "transfer cancelled",
                )),
                st,
            ));
        }
        let mut buf = vec![0u8; st.chunk_size];
        match st.file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                st.sent += n as u64;
                if st.total > 0 {
                    ProgressReporter::update(&st.reporter, st.sent as f64 / st.total as f64);
                }
                Some((Ok(buf), st))
            }
            Err(e) => {
                st.done = true;
                Some((Err(e), st))
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::InMemoryObjectStore;
    use crate::retry::{RetryConfig, RetryPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    fn test_policy() -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            jitter: false,
        })
    }

    fn coordinator(store: Arc<InMemoryObjectStore>) -> TransferCoordinator {
        TransferCoordinator::new(
            store,
            test_policy(),
            TransferConfig {
                max_concurrent: 3,
                chunk_size: 16 * 1024,
                // No throttling in tests so every chunk update is observed.
                progress_interval: Duration::ZERO,
            },
        )
    }

    async fn asset_with_payload(dir: &Path, name: &str, len: usize) -> Asset {
        let path = dir.join(name);
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &payload).await.unwrap();
        Asset::new_local("owner-1", name, path, len as u64)
    }

    fn collecting_progress() -> (ProgressFn, Arc<Mutex<Vec<f64>>>) {
        let values: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        let handler: ProgressFn = Arc::new(move |fraction| {
            sink.lock().unwrap().push(fraction);
        });
        (handler, values)
    }

    #[tokio::test]
    async fn test_upload_streams_payload_and_reports_progress() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = coordinator(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_payload(dir.path(), "clip.mov", 100 * 1024).await;
        let (progress, values) = collecting_progress();

        let reference = coordinator
            .upload(&asset, &CancellationToken::new(), Some(progress))
            .await
            .unwrap();

        assert_eq!(reference.as_str(), "owner-1/clip.mov");
        assert_eq!(store.object(&reference).unwrap().len(), 100 * 1024);

        let values = values.lock().unwrap();
        assert_eq!(*values.first().unwrap(), 0.0);
        assert_eq!(*values.last().unwrap(), 1.0);
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "non-decreasing");
        assert!(values.len() > 2, "intermediate updates expected");
    }

    #[tokio::test]
    async fn test_upload_missing_local_file() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = coordinator(store);
        let mut asset = Asset::new_local("owner-1", "gone.mov", "/nope/gone.mov".into(), 1);

        let result = coordinator
            .upload(&asset, &CancellationToken::new(), None)
            .await;
        assert!(matches!(result, Err(SyncError::LocalFileMissing(_))));

        asset.local_path = None;
        let result = coordinator
            .upload(&asset, &CancellationToken::new(), None)
            .await;
        assert!(matches!(result, Err(SyncError::LocalFileMissing(_))));
    }

    #[tokio::test]
    async fn test_upload_retries_transient_failure() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = coordinator(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_payload(dir.path(), "clip.mov", 1024).await;

        store.inject_put_error(SyncError::NetworkUnavailable);
        let reference = coordinator
            .upload(&asset, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert!(store.contains(&reference));
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_at_most_one_transfer_per_asset() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = Arc::new(coordinator(Arc::clone(&store)));
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_payload(dir.path(), "clip.mov", 1024).await;

        let gate = Arc::new(Semaphore::new(0));
        store.set_put_gate(Arc::clone(&gate));

        let first = {
            let coordinator = Arc::clone(&coordinator);
            let asset = asset.clone();
            tokio::spawn(async move {
                coordinator
                    .upload(&asset, &CancellationToken::new(), None)
                    .await
            })
        };
        let observe = Arc::clone(&store);
        wait_until(move || observe.active_puts() == 1).await;

        // Second transfer for the same asset id fails fast.
        let second = coordinator
            .upload(&asset, &CancellationToken::new(), None)
            .await;
        assert!(matches!(
            second,
            Err(SyncError::UploadFailed { transient: false, .. })
        ));

        gate.add_permits(1);
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_same_file_name_under_different_owners_downloads_concurrently() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = coordinator(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();

        // Two distinct assets whose payloads share a file name.
        let path = dir.path().join("clip.mov");
        tokio::fs::write(&path, b"first").await.unwrap();
        let first = Asset::new_local("owner-1", "clip.mov", path.clone(), 5);
        let second = Asset::new_local("owner-2", "clip.mov", path, 5);

        let cancel = CancellationToken::new();
        coordinator.upload(&first, &cancel, None).await.unwrap();
        coordinator.upload(&second, &cancel, None).await.unwrap();

        // Concurrent downloads are keyed by the full scoped reference, so
        // they never collide on the shared name.
        let ref_1 = RemoteRef::parse("owner-1/clip.mov").unwrap();
        let ref_2 = RemoteRef::parse("owner-2/clip.mov").unwrap();
        let target_1 = dir.path().join("one.mov");
        let target_2 = dir.path().join("two.mov");
        let (res_1, res_2) = tokio::join!(
            coordinator.download(&ref_1, &target_1, &cancel, None),
            coordinator.download(&ref_2, &target_2, &cancel, None),
        );
        res_1.unwrap();
        res_2.unwrap();
        assert_eq!(tokio::fs::read(&target_1).await.unwrap(), b"first");
        assert_eq!(tokio::fs::read(&target_2).await.unwrap(), b"first");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_respects_concurrency_ceiling() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = Arc::new(coordinator(Arc::clone(&store)));
        let dir = tempfile::tempdir().unwrap();

        let mut assets = Vec::new();
        for i in 0..4 {
            assets.push(asset_with_payload(dir.path(), &format!("clip-{i}.mov"), 2048).await);
        }

        let gate = Arc::new(Semaphore::new(0));
        store.set_put_gate(Arc::clone(&gate));

        let handle = {
            let coordinator = Arc::clone(&coordinator);
            let assets = assets.clone();
            tokio::spawn(async move {
                coordinator
                    .upload_batch(&assets, &CancellationToken::new())
                    .await
            })
        };

        // Three start immediately; the fourth waits for a free slot.
        let observe = Arc::clone(&store);
        wait_until(move || observe.active_puts() == 3).await;
        assert!(store.object_count() == 0, "all three still held open");

        // Let one complete; the queued item takes its slot.
        gate.add_permits(1);
        let observe = Arc::clone(&store);
        wait_until(move || observe.object_count() == 1).await;
        let observe = Arc::clone(&store);
        wait_until(move || observe.active_puts() == 3).await;

        gate.add_permits(3);
        let results = handle.await.unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(store.max_active_puts(), 3);
    }

    #[tokio::test]
    async fn test_batch_isolates_per_item_failure() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = coordinator(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();

        let mut assets = Vec::new();
        for i in 0..3 {
            assets.push(asset_with_payload(dir.path(), &format!("clip-{i}.mov"), 512).await);
        }
        store.inject_put_error(SyncError::QuotaExceeded);

        let results = coordinator
            .upload_batch(&assets, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 3);
        let failed = failed_ids(&results);
        assert_eq!(failed.len(), 1);
        assert_eq!(results.iter().filter(|(_, r)| r.is_ok()).count(), 2);
    }

    #[tokio::test]
    async fn test_download_roundtrip_with_progress() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = coordinator(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_payload(dir.path(), "clip.mov", 100 * 1024).await;

        let reference = coordinator
            .upload(&asset, &CancellationToken::new(), None)
            .await
            .unwrap();

        let target = dir.path().join("fetched").join("clip.mov");
        let (progress, values) = collecting_progress();
        coordinator
            .download(&reference, &target, &CancellationToken::new(), Some(progress))
            .await
            .unwrap();

        let fetched = tokio::fs::read(&target).await.unwrap();
        assert_eq!(fetched.len(), 100 * 1024);
        assert_eq!(fetched, tokio::fs::read(asset.local_path.unwrap()).await.unwrap());

        let values = values.lock().unwrap();
        assert_eq!(*values.first().unwrap(), 0.0);
        assert_eq!(*values.last().unwrap(), 1.0);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_download_retries_transient_failure() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = coordinator(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_payload(dir.path(), "clip.mov", 512).await;
        let reference = coordinator
            .upload(&asset, &CancellationToken::new(), None)
            .await
            .unwrap();

        store.inject_get_error(SyncError::NetworkUnavailable);
        let target = dir.path().join("out.mov");
        coordinator
            .download(&reference, &target, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert!(target.exists());
    }

    #[tokio::test]
    async fn test_cancelled_download_leaves_no_partial_file() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = coordinator(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_payload(dir.path(), "clip.mov", 100 * 1024).await;
        let reference = coordinator
            .upload(&asset, &CancellationToken::new(), None)
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let cancel_on_progress = cancel.clone();
        let emitted_after_cancel = Arc::new(AtomicUsize::new(0));
        let emitted_clone = Arc::clone(&emitted_after_cancel);
        let progress: ProgressFn = Arc::new(move |fraction| {
            if cancel_on_progress.is_cancelled() {
                emitted_clone.fetch_add(1, Ordering::SeqCst);
            }
            // Cancel as soon as real bytes start flowing.
            if fraction > 0.0 && fraction < 1.0 {
                cancel_on_progress.cancel();
            }
        });

        let target = dir.path().join("out.mov");
        let result = coordinator
            .download(&reference, &target, &cancel, Some(progress))
            .await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(!target.exists(), "partial file must be removed");
        assert_eq!(
            emitted_after_cancel.load(Ordering::SeqCst),
            0,
            "no progress events after cancellation"
        );
    }

    #[tokio::test]
    async fn test_pre_cancelled_upload_does_not_start() {
        let store = Arc::new(InMemoryObjectStore::new());
        let coordinator = coordinator(Arc::clone(&store));
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_payload(dir.path(), "clip.mov", 512).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (progress, values) = collecting_progress();

        let result = coordinator.upload(&asset, &cancel, Some(progress)).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(values.lock().unwrap().is_empty(), "no events after cancel");
        let reference = RemoteRef::parse("owner-1/clip.mov").unwrap();
        assert!(!store.contains(&reference));
    }
}
