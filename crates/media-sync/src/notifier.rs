//! ChangeNotifier: server-side subscriptions and inbound change handling.
//!
//! Two inbound paths feed the engine. Pushes arrive as opaque payloads and
//! are classified into local actions by their subscription id. The
//! continuous listener consumes the document store's change stream directly
//! and dedupes redelivered additions by document id.

use crate::document_store::{ChangeKind, DocumentStore};
use crate::error::Result;
use crate::events::{EventBus, MediaEvent};
use crate::model::VideoDocument;
use crate::push::{DeliveryOptions, PushClient, SubscriptionRegistration};
use futures::stream::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Document type of the media metadata collection.
pub const VIDEOS_DOCUMENT_TYPE: &str = "videos";

/// Document type of the user preferences collection.
pub const PREFS_DOCUMENT_TYPE: &str = "prefs";

/// Canonical subscription id: `{document_type}-changes-{owner}`.
///
/// Deterministic ids make re-registration idempotent; the server replaces
/// the registration instead of accumulating duplicates.
pub fn subscription_id(document_type: &str, owner: &str) -> String {
    format!("{document_type}-changes-{owner}")
}

/// Decoded push payload.
#[derive(Debug, Clone)]
pub enum PushPayload {
    /// Fired by a query-scoped subscription.
    Query {
        subscription_id: String,
        document_id: Option<String>,
    },
    /// Store-wide notification with no subscription context.
    StoreWide,
}

/// What the app should do in response to a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAction {
    /// Refresh the named video, or the whole list when the push did not say.
    VideoChanged { document_id: Option<String> },
    /// Reload user preferences.
    PreferencesChanged,
    /// Resync everything; the push could not be attributed.
    FullResync,
}

/// Manages push subscriptions and turns inbound changes into local actions.
pub struct ChangeNotifier {
    push: Arc<dyn PushClient>,
    documents: Arc<dyn DocumentStore>,
    events: Arc<EventBus>,
}

impl ChangeNotifier {
    pub fn new(
        push: Arc<dyn PushClient>,
        documents: Arc<dyn DocumentStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            push,
            documents,
            events,
        }
    }

    /// Register the owner's subscription for a document type. Safe to call
    /// on every app launch; an existing registration is left untouched.
    pub async fn register_subscription(
        &self,
        document_type: &str,
        owner: &str,
    ) -> Result<String> {
        let id = subscription_id(document_type, owner);
        let existing = self.push.list().await?;
        if existing.iter().any(|s| s.id == id) {
            debug!(subscription_id = %id, "subscription already registered");
            return Ok(id);
        }

        let registered = self
            .push
            .register(SubscriptionRegistration {
                id: id.clone(),
                document_type: document_type.to_string(),
                predicate: format!("ownerId == \"{owner}\""),
                delivery: DeliveryOptions::default(),
            })
            .await?;
        info!(subscription_id = %registered, "subscription registered");
        Ok(registered)
    }

    /// Remove every registration, e.g. on sign-out.
    pub async fn remove_all_subscriptions(&self) -> Result<()> {
        for sub in self.push.list().await? {
            self.push.unregister(&sub.id).await?;
            debug!(subscription_id = %sub.id, "subscription removed");
        }
        Ok(())
    }

    /// Drop stale registrations and re-register the canonical videos
    /// subscription for the given owner, e.g. after an account switch.
    pub async fn refresh_subscriptions(&self, owner: &str) -> Result<String> {
        self.remove_all_subscriptions().await?;
        self.register_subscription(VIDEOS_DOCUMENT_TYPE, owner).await
    }

    /// Classify an inbound push into the action the app should take.
    /// Unattributable pushes degrade to a full resync rather than being
    /// dropped.
    pub fn on_push(&self, payload: PushPayload) -> LocalAction {
        match payload {
            PushPayload::Query {
                subscription_id,
                document_id,
            } => {
                if subscription_id.starts_with(&format!("{VIDEOS_DOCUMENT_TYPE}-changes-")) {
                    self.events.emit(MediaEvent::RemoteVideoChanged {
                        document_id: document_id.clone(),
                    });
                    LocalAction::VideoChanged { document_id }
                } else if subscription_id.starts_with(&format!("{PREFS_DOCUMENT_TYPE}-changes-")) {
                    self.events.emit(MediaEvent::PreferencesChanged);
                    LocalAction::PreferencesChanged
                } else {
                    debug!(subscription_id = %subscription_id, "push from unknown subscription");
                    self.events.emit(MediaEvent::FullResyncRequested);
                    LocalAction::FullResync
                }
            }
            PushPayload::StoreWide => {
                self.events.emit(MediaEvent::FullResyncRequested);
                LocalAction::FullResync
            }
        }
    }

    /// Spawn a task consuming the owner's change stream until cancelled.
    ///
    /// Only additions are forwarded; modifications and removals propagate
    /// through pushes and full resyncs. The transport may redeliver, so each
    /// document id fires `on_new_item` at most once per listener.
    pub fn listen_continuous(
        &self,
        owner: &str,
        cancel: CancellationToken,
        on_new_item: impl Fn(VideoDocument) + Send + Sync + 'static,
    ) -> JoinHandle<()> {
        let mut changes = self.documents.watch(owner);
        let events = Arc::clone(&self.events);
        let owner = owner.to_string();

        tokio::spawn(async move {
            let mut seen: HashSet<String> = HashSet::new();
            info!(owner = %owner, "continuous listener started");
            loop {
                let change = tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = changes.next() => match change {
                        Some(change) => change,
                        None => break,
                    },
                };
                if change.kind != ChangeKind::Added {
                    continue;
                }
                if !seen.insert(change.doc.id.clone()) {
                    debug!(document_id = %change.doc.id, "duplicate delivery ignored");
                    continue;
                }
                events.emit(MediaEvent::RemoteVideoAdded {
                    document_id: change.doc.id.clone(),
                });
                on_new_item(change.doc);
            }
            info!(owner = %owner, "continuous listener stopped");
        })
    }
}
