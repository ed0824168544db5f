//! LocalStore trait for the device-local asset records.
//!
//! The engine only ever touches the sync-state fields carried by `Asset`;
//! business fields of the host application's data model stay behind the
//! host's own persistence layer.

use crate::error::Result;
use crate::model::{Asset, AssetId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Device-local persistent store of asset records.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Asset>>;

    /// Create or replace an asset record.
    async fn upsert(&self, asset: Asset) -> Result<()>;

    /// Remove a record. Removing an absent record is a no-op.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Assets awaiting a remote write (`needs_sync` and not remotely deleted).
    async fn list_pending_sync(&self, owner: &str) -> Result<Vec<Asset>>;

    /// Assets visible to the user (not remotely deleted).
    async fn list_active(&self, owner: &str) -> Result<Vec<Asset>>;
}

/// In-memory local store for tests.
pub struct InMemoryLocalStore {
    assets: RwLock<HashMap<AssetId, Asset>>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self {
            assets: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.assets.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn get(&self, id: &str) -> Result<Option<Asset>> {
        Ok(self.assets.read().unwrap().get(id).cloned())
    }

    async fn upsert(&self, asset: Asset) -> Result<()> {
        self.assets
            .write()
            .unwrap()
            .insert(asset.id.clone(), asset);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.assets.write().unwrap().remove(id);
        Ok(())
    }

    async fn list_pending_sync(&self, owner: &str) -> Result<Vec<Asset>> {
        let assets = self.assets.read().unwrap();
        let mut pending: Vec<Asset> = assets
            .values()
            .filter(|a| a.owner == owner && a.sync.needs_sync && !a.sync.is_deleted_remotely)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(pending)
    }

    async fn list_active(&self, owner: &str) -> Result<Vec<Asset>> {
        let assets = self.assets.read().unwrap();
        let mut active: Vec<Asset> = assets
            .values()
            .filter(|a| a.owner == owner && !a.sync.is_deleted_remotely)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }
}
