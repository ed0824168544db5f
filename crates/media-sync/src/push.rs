//! PushClient trait for the remote subscription service.
//!
//! A subscription is a server-side registration that triggers delivery of
//! change notifications matching a predicate. Registrations carry
//! client-chosen ids so re-registration can be made idempotent.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// How matching changes should be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    /// Silent pushes wake the app without user-visible notification.
    pub silent: bool,
    pub alert_body: Option<String>,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            silent: true,
            alert_body: None,
        }
    }
}

/// One server-side subscription registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRegistration {
    /// Client-chosen identifier; the server keys registrations by it.
    pub id: String,
    /// Target document type (e.g. "videos").
    pub document_type: String,
    /// Trigger predicate (e.g. `ownerId == "..."`).
    pub predicate: String,
    pub delivery: DeliveryOptions,
}

/// Remote push/subscription service.
#[async_trait]
pub trait PushClient: Send + Sync {
    /// Register a subscription, returning its id. Registering an id that
    /// already exists replaces the previous registration.
    async fn register(&self, registration: SubscriptionRegistration) -> Result<String>;

    /// List the caller's registrations.
    async fn list(&self) -> Result<Vec<SubscriptionRegistration>>;

    /// Remove a registration. Removing an unknown id is a no-op.
    async fn unregister(&self, id: &str) -> Result<()>;
}

/// In-memory push client for tests.
pub struct InMemoryPushClient {
    subscriptions: RwLock<HashMap<String, SubscriptionRegistration>>,
    register_calls: AtomicUsize,
}

impl InMemoryPushClient {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            register_calls: AtomicUsize::new(0),
        }
    }

    /// How many register calls actually reached the server.
    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryPushClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushClient for InMemoryPushClient {
    async fn register(&self, registration: SubscriptionRegistration) -> Result<String> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let id = registration.id.clone();
        self.subscriptions
            .write()
            .unwrap()
            .insert(id.clone(), registration);
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<SubscriptionRegistration>> {
        let mut subs: Vec<SubscriptionRegistration> = self
            .subscriptions
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect();
        subs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(subs)
    }

    async fn unregister(&self, id: &str) -> Result<()> {
        self.subscriptions.write().unwrap().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(id: &str) -> SubscriptionRegistration {
        SubscriptionRegistration {
            id: id.into(),
            document_type: "videos".into(),
            predicate: "ownerId == \"owner-1\"".into(),
            delivery: DeliveryOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_register_list_unregister() {
        let client = InMemoryPushClient::new();
        client.register(registration("sub-1")).await.unwrap();
        client.register(registration("sub-2")).await.unwrap();

        let subs = client.list().await.unwrap();
        assert_eq!(subs.len(), 2);

        client.unregister("sub-1").await.unwrap();
        let subs = client.list().await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, "sub-2");
    }

    #[tokio::test]
    async fn test_register_same_id_replaces() {
        let client = InMemoryPushClient::new();
        client.register(registration("sub-1")).await.unwrap();
        client.register(registration("sub-1")).await.unwrap();
        assert_eq!(client.list().await.unwrap().len(), 1);
        assert_eq!(client.register_calls(), 2);
    }
}
