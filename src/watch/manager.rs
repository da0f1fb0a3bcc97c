//! Watch manager for broadcasting store views.

use crate::types::NotificationView;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{DropReason, ViewEvent, WatchConfig, WatchHandle, WatchId};

/// Internal watcher state.
struct Watcher {
    sender: Sender<ViewEvent>,
}

impl Watcher {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (watcher will be dropped).
    fn try_send(&self, event: ViewEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Manages watchers and broadcasts views.
pub struct WatchManager {
    /// Active watchers by ID.
    watchers: RwLock<HashMap<WatchId, Watcher>>,
    /// Counter for generating watcher IDs.
    next_id: AtomicU64,
}

impl WatchManager {
    pub fn new() -> Self {
        Self {
            watchers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new watcher.
    ///
    /// When `config.emit_current` is set, `current` is queued as the first
    /// event.
    pub fn watch(&self, config: WatchConfig, current: NotificationView) -> WatchHandle {
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        let watcher = Watcher { sender };
        if config.emit_current {
            // Fresh channel with capacity >= 1, cannot be full.
            let _ = watcher.try_send(ViewEvent::Changed { view: current });
        }

        self.watchers.write().insert(id, watcher);

        WatchHandle { id, receiver }
    }

    /// Unwatch and clean up.
    pub fn unwatch(&self, id: WatchId) {
        let mut watchers = self.watchers.write();
        if let Some(watcher) = watchers.remove(&id) {
            // Best effort
            let _ = watcher.sender.try_send(ViewEvent::Dropped {
                reason: DropReason::Unwatched,
            });
        }
    }

    /// Get watcher count.
    pub fn watch_count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Broadcast a view to every watcher. Drops watchers that fail to receive.
    pub fn broadcast(&self, view: &NotificationView) {
        let mut to_remove = Vec::new();

        {
            let watchers = self.watchers.read();
            for (id, watcher) in watchers.iter() {
                let event = ViewEvent::Changed { view: view.clone() };
                if !watcher.try_send(event) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut watchers = self.watchers.write();
            for id in to_remove {
                if let Some(watcher) = watchers.remove(&id) {
                    tracing::debug!(watch = id.0, "dropping slow watcher");
                    // Might fail, that's ok
                    let _ = watcher.sender.try_send(ViewEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for WatchManager {
    fn default() -> Self {
        Self::new()
    }
}
