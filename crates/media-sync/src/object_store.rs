//! ObjectStore trait for remote payload storage.
//!
//! Payloads are addressed by scoped `{owner}/{name}` references and moved as
//! chunk streams so a transfer never buffers a whole file in memory. The
//! in-memory implementation exists for tests and carries failure-injection
//! and concurrency-observation hooks.

use crate::error::{Result, SyncError};
use crate::model::RemoteRef;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Semaphore;

/// Chunked payload bytes.
pub type ByteStream = BoxStream<'static, std::io::Result<Vec<u8>>>;

/// Remote object storage: streamed put/get, delete, and list by owner.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object, consuming the chunk stream. `len` is the expected
    /// total size in bytes.
    async fn put(&self, reference: &RemoteRef, data: ByteStream, len: u64) -> Result<()>;

    /// Fetch an object as a chunk stream plus its total size.
    async fn get(&self, reference: &RemoteRef) -> Result<(ByteStream, u64)>;

    /// Delete an object. `NotFound` if it does not exist.
    async fn delete(&self, reference: &RemoteRef) -> Result<()>;

    /// List references under an owner scope.
    async fn list(&self, owner: &str) -> Result<Vec<RemoteRef>>;
}

fn map_put_io(err: std::io::Error) -> SyncError {
    if err.kind() == std::io::ErrorKind::Interrupted {
        return SyncError::Cancelled;
    }
    let transient = matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::BrokenPipe
    );
    SyncError::UploadFailed {
        reason: err.to_string(),
        transient,
    }
}

/// In-memory object store for tests.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    active_puts: AtomicUsize,
    max_active_puts: AtomicUsize,
    put_errors: Mutex<VecDeque<SyncError>>,
    get_errors: Mutex<VecDeque<SyncError>>,
    delete_errors: Mutex<VecDeque<SyncError>>,
    /// When set, each put consumes one permit before completing.
    put_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            active_puts: AtomicUsize::new(0),
            max_active_puts: AtomicUsize::new(0),
            put_errors: Mutex::new(VecDeque::new()),
            get_errors: Mutex::new(VecDeque::new()),
            delete_errors: Mutex::new(VecDeque::new()),
            put_gate: Mutex::new(None),
        }
    }

    /// Fail the next put with the given error.
    pub fn inject_put_error(&self, err: SyncError) {
        self.put_errors.lock().unwrap().push_back(err);
    }

    /// Fail the next get with the given error.
    pub fn inject_get_error(&self, err: SyncError) {
        self.get_errors.lock().unwrap().push_back(err);
    }

    /// Fail the next delete with the given error.
    pub fn inject_delete_error(&self, err: SyncError) {
        self.delete_errors.lock().unwrap().push_back(err);
    }

    /// Gate puts on a semaphore so tests can hold transfers open.
    pub fn set_put_gate(&self, gate: Arc<Semaphore>) {
        *self.put_gate.lock().unwrap() = Some(gate);
    }

    pub fn contains(&self, reference: &RemoteRef) -> bool {
        self.objects
            .read()
            .unwrap()
            .contains_key(reference.as_str())
    }

    pub fn object(&self, reference: &RemoteRef) -> Option<Vec<u8>> {
        self.objects.read().unwrap().get(reference.as_str()).cloned()
    }

    /// How many objects are stored.
    pub fn object_count(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    /// Puts currently being consumed.
    pub fn active_puts(&self) -> usize {
        self.active_puts.load(Ordering::SeqCst)
    }

    /// High-water mark of simultaneously active puts.
    pub fn max_active_puts(&self) -> usize {
        self.max_active_puts.load(Ordering::SeqCst)
    }

    fn enter_put(&self) {
        let active = self.active_puts.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_puts.fetch_max(active, Ordering::SeqCst);
    }

    fn leave_put(&self) {
        self.active_puts.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, reference: &RemoteRef, mut data: ByteStream, len: u64) -> Result<()> {
        if let Some(err) = self.put_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        self.enter_put();
        let gate = self.put_gate.lock().unwrap().clone();
        let result = async {
            if let Some(gate) = gate {
                match gate.acquire().await {
                    Ok(permit) => permit.forget(),
                    Err(_) => return Err(SyncError::Cancelled),
                }
            }

            let mut buf = Vec::with_capacity(len as usize);
            while let Some(chunk) = data.next().await {
                buf.extend_from_slice(&chunk.map_err(map_put_io)?);
            }
            if buf.len() as u64 != len {
                return Err(SyncError::UploadFailed {
                    reason: format!("length mismatch: expected {len}, got {}", buf.len()),
                    transient: false,
                });
            }
            self.objects
                .write()
                .unwrap()
                .insert(reference.as_str().to_string(), buf);
            Ok(())
        }
        .await;
        self.leave_put();
        result
    }

    async fn get(&self, reference: &RemoteRef) -> Result<(ByteStream, u64)> {
        if let Some(err) = self.get_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let bytes = self
            .objects
            .read()
            .unwrap()
            .get(reference.as_str())
            .cloned()
            .ok_or_else(|| SyncError::NotFound(reference.as_str().to_string()))?;

        let len = bytes.len() as u64;
        // Chunked so downloads exercise incremental progress.
        let chunks: Vec<std::io::Result<Vec<u8>>> = bytes
            .chunks(32 * 1024)
            .map(|c| Ok(c.to_vec()))
            .collect();
        Ok((stream::iter(chunks).boxed(), len))
    }

    async fn delete(&self, reference: &RemoteRef) -> Result<()> {
        if let Some(err) = self.delete_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.objects
            .write()
            .unwrap()
            .remove(reference.as_str())
            .map(|_| ())
            .ok_or_else(|| SyncError::NotFound(reference.as_str().to_string()))
    }

    async fn list(&self, owner: &str) -> Result<Vec<RemoteRef>> {
        let prefix = format!("{owner}/");
        let objects = self.objects.read().unwrap();
        let mut refs: Vec<RemoteRef> = objects
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .filter_map(|k| RemoteRef::parse(k.clone()).ok())
            .collect();
        refs.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(refs)
    }
}
