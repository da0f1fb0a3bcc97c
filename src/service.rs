//! The notification sync service tying all components together.

use crate::backend::{ChangeFeed, NotificationApi};
use crate::config::SyncConfig;
use crate::coordinator::MutationCoordinator;
use crate::error::Result;
use crate::loader::SnapshotLoader;
use crate::store::NotificationStore;
use crate::subscriber::{ChangeStreamSubscriber, SessionState};
use crate::types::{NotificationId, NotificationView, OwnerId};
use crate::watch::{WatchConfig, WatchHandle, WatchId};
use std::sync::Arc;

/// Client-side view of the signed-in user's notifications.
///
/// Provides a unified interface for:
/// - Starting and stopping the per-owner session
/// - Reading (and watching) the merged, deduplicated list and unread count
/// - Dismissing one notification or clearing them all
pub struct NotificationSync {
    config: SyncConfig,
    store: Arc<NotificationStore>,
    subscriber: ChangeStreamSubscriber,
    coordinator: MutationCoordinator,
}

impl NotificationSync {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        feed: Arc<dyn ChangeFeed>,
        config: SyncConfig,
    ) -> Self {
        let store = Arc::new(NotificationStore::new());
        let loader = Arc::new(SnapshotLoader::new(Arc::clone(&api), config.snapshot_limit));
        let subscriber =
            ChangeStreamSubscriber::new(Arc::clone(&store), Arc::clone(&loader), feed);
        let coordinator = MutationCoordinator::new(Arc::clone(&store), api, loader);

        Self {
            config,
            store,
            subscriber,
            coordinator,
        }
    }

    /// Build from a single object serving both the API and the feed.
    pub fn with_backend<B>(backend: Arc<B>, config: SyncConfig) -> Self
    where
        B: NotificationApi + ChangeFeed + 'static,
    {
        Self::new(backend.clone(), backend, config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // --- Session ---

    pub fn start(&self, owner: OwnerId) -> Result<()> {
        self.subscriber.start(owner)
    }

    pub fn stop(&self) {
        self.subscriber.stop();
    }

    /// Follow the signed-in user: `None` ends the session.
    pub fn set_owner(&self, owner: Option<OwnerId>) -> Result<()> {
        match owner {
            Some(owner) => self.start(owner),
            None => {
                self.stop();
                Ok(())
            }
        }
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.subscriber.owner()
    }

    pub fn state(&self) -> SessionState {
        self.subscriber.state()
    }

    /// Reload the snapshot for the active owner.
    pub fn refresh(&self) -> Result<()> {
        self.subscriber.refresh()
    }

    // --- Reads ---

    pub fn view(&self) -> NotificationView {
        self.store.snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.store.unread_count()
    }

    pub fn watch(&self) -> WatchHandle {
        self.store
            .watch(WatchConfig::with_buffer_size(self.config.watch_buffer))
    }

    pub fn unwatch(&self, id: WatchId) {
        self.store.unwatch(id);
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    // --- Mutations ---

    pub fn remove_one(&self, id: &NotificationId) -> Result<()> {
        self.coordinator.remove_one(id)
    }

    pub fn clear_all(&self, owner: &OwnerId) -> Result<()> {
        self.coordinator.clear_all(owner)
    }
}
