//! media-sync: Cloud synchronization engine for device-captured media.
//!
//! This crate provides the core functionality for:
//! - Streamed payload transfers with progress, retries, and cancellation
//! - Metadata document writes with optimistic conflict detection
//! - Rollback pairing of uploads with their metadata writes
//! - Push subscriptions and continuous change listening
//! - ObjectStore/DocumentStore/LocalStore/PushClient trait abstractions

pub mod document_store;
pub mod engine;
pub mod error;
pub mod events;
pub mod local_store;
pub mod metadata;
pub mod model;
pub mod notifier;
pub mod object_store;
pub mod push;
pub mod retry;
pub mod rollback;
pub mod transfer;

pub use document_store::{ChangeKind, DocChange, DocumentStore, InMemoryDocumentStore};
pub use engine::{EngineConfig, MediaSyncEngine};
pub use error::{Result, SyncError};
pub use events::{EventBus, MediaEvent, Subscription};
pub use local_store::{InMemoryLocalStore, LocalStore};
pub use metadata::{MetadataSynchronizer, WriteOutcome};
pub use model::{Asset, AssetId, DocumentFields, RemoteRef, SyncState, VideoDocument};
pub use notifier::{
    ChangeNotifier, LocalAction, PushPayload, PREFS_DOCUMENT_TYPE, VIDEOS_DOCUMENT_TYPE,
};
pub use object_store::{ByteStream, InMemoryObjectStore, ObjectStore};
pub use push::{DeliveryOptions, InMemoryPushClient, PushClient, SubscriptionRegistration};
pub use retry::{RetryConfig, RetryPolicy};
pub use rollback::RollbackGuard;
pub use transfer::{ProgressFn, TransferConfig, TransferCoordinator};
