//! DocumentStore trait for the remote `videos` collection.
//!
//! Point reads/writes, equality-filtered ordered queries, and a change
//! stream for continuous server-side queries. The in-memory implementation
//! backs the tests, including transport-redelivery simulation.

use crate::error::{Result, SyncError};
use crate::model::VideoDocument;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Kind of change observed by a continuous query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One change emitted by the document store's change stream.
#[derive(Debug, Clone)]
pub struct DocChange {
    pub kind: ChangeKind,
    pub doc: VideoDocument,
}

/// Remote document store keyed by asset id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<VideoDocument>>;

    /// Create or replace a document.
    async fn put(&self, doc: VideoDocument) -> Result<()>;

    /// Documents for an owner, ordered by `createdAt` descending.
    /// Soft-deleted rows are excluded unless `include_deleted` is set.
    async fn query(&self, owner: &str, include_deleted: bool) -> Result<Vec<VideoDocument>>;

    /// Continuous change stream scoped to an owner. The underlying transport
    /// may redeliver changes; consumers dedupe by document id.
    fn watch(&self, owner: &str) -> BoxStream<'static, DocChange>;
}

/// In-memory document store for tests.
pub struct InMemoryDocumentStore {
    docs: RwLock<HashMap<String, VideoDocument>>,
    changes: broadcast::Sender<DocChange>,
    put_errors: Mutex<VecDeque<SyncError>>,
    get_errors: Mutex<VecDeque<SyncError>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            docs: RwLock::new(HashMap::new()),
            changes,
            put_errors: Mutex::new(VecDeque::new()),
            get_errors: Mutex::new(VecDeque::new()),
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

    /// Re-emit a change, simulating transport redelivery.
    pub fn emit_change(&self, change: DocChange) {
        let _ = self.changes.send(change);
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<VideoDocument>> {
        if let Some(err) = self.get_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.docs.read().unwrap().get(id).cloned())
    }

    async fn put(&self, doc: VideoDocument) -> Result<()> {
        if let Some(err) = self.put_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let kind = {
            let mut docs = self.docs.write().unwrap();
            let kind = if docs.contains_key(&doc.id) {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            };
            docs.insert(doc.id.clone(), doc.clone());
            kind
        };
        let _ = self.changes.send(DocChange { kind, doc });
        Ok(())
    }

    async fn query(&self, owner: &str, include_deleted: bool) -> Result<Vec<VideoDocument>> {
        if let Some(err) = self.get_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let docs = self.docs.read().unwrap();
        let mut matched: Vec<VideoDocument> = docs
            .values()
            .filter(|d| d.owner_id == owner && (include_deleted || !d.is_deleted))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }

    fn watch(&self, owner: &str) -> BoxStream<'static, DocChange> {
        let owner = owner.to_string();
        BroadcastStream::new(self.changes.subscribe())
            .filter_map(move |res| {
                let owner = owner.clone();
                async move {
                    // Lagged receivers drop missed changes; a full resync
                    // covers that case.
                    res.ok().filter(|c: &DocChange| c.doc.owner_id == owner)
                }
            })
            .boxed()
    }
}
