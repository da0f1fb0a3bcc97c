//! Optimistic dismiss and clear-all.
//!
//! Both mutations change the store first and ask the backend second. What
//! happens on a backend failure differs:
//!
//! - `remove_one` resynchronizes. Between the local removal and the failure,
//!   push events may have changed the set, so putting the record back could
//!   resurrect something the backend no longer has.
//! - `clear_all` rolls back to the exact set captured before clearing.
//!
//! If the owner changes while the backend call is pending, neither
//! compensation runs; the error is still returned to the caller.

use crate::backend::NotificationApi;
use crate::error::{Result, SyncError};
use crate::loader::SnapshotLoader;
use crate::store::NotificationStore;
use crate::types::{NotificationId, OwnerId};
use std::sync::Arc;

/// Runs user-initiated mutations against the store and the backend.
pub struct MutationCoordinator {
    store: Arc<NotificationStore>,
    api: Arc<dyn NotificationApi>,
    loader: Arc<SnapshotLoader>,
}

impl MutationCoordinator {
    pub fn new(
        store: Arc<NotificationStore>,
        api: Arc<dyn NotificationApi>,
        loader: Arc<SnapshotLoader>,
    ) -> Self {
        Self { store, api, loader }
    }

    /// Dismiss one notification.
    ///
    /// Ids not in the store are ignored without contacting the backend.
    pub fn remove_one(&self, id: &NotificationId) -> Result<()> {
        let (epoch, owner) = {
            let mut writer = self.store.write();
            if writer.remove_by_id(id).is_none() {
                tracing::debug!(%id, "dismiss of unknown notification ignored");
                return Ok(());
            }
            (writer.epoch(), writer.owner().cloned())
        };

        let Err(error) = self.api.delete_notification(id) else {
            tracing::debug!(%id, "notification dismissed");
            return Ok(());
        };

        tracing::warn!(%id, %error, "dismiss failed, resynchronizing");
        if let Some(owner) = owner {
            // A failed resync is logged by the loader and leaves the
            // optimistic state in place.
            let _ = self.loader.resync(&self.store, &owner, epoch);
        }
        Err(error.into())
    }

    /// Dismiss every notification of `owner`, the active owner.
    pub fn clear_all(&self, owner: &OwnerId) -> Result<()> {
        let (before, epoch) = {
            let mut writer = self.store.write();
            match writer.owner() {
                Some(active) if active == owner => {}
                Some(active) => {
                    return Err(SyncError::OwnerMismatch {
                        active: Some(active.clone()),
                        requested: owner.clone(),
                    })
                }
                None => return Err(SyncError::NoOwner),
            }
            let before = writer.view();
            writer.reset();
            (before, writer.epoch())
        };

        let Err(error) = self.api.delete_all_notifications(owner) else {
            tracing::debug!(%owner, cleared = before.len(), "notifications cleared");
            return Ok(());
        };

        tracing::warn!(%owner, %error, "clear failed, rolling back");
        match self.store.writer(epoch) {
            Some(mut writer) => writer.restore(&before),
            None => tracing::debug!(%owner, %epoch, "session changed during clear, rollback skipped"),
        }
        Err(error.into())
    }
}
