//! Bulk snapshot loading.

use crate::backend::NotificationApi;
use crate::error::FetchError;
use crate::store::NotificationStore;
use crate::types::{Epoch, Notification, OwnerId};
use std::sync::Arc;

/// Outcome of applying a fetched snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The store was updated.
    Applied,
    /// The session moved on while the fetch was in flight; result dropped.
    Stale,
    /// A fetch started later was applied first; result dropped.
    Superseded,
}

/// Fetches the most recent notifications for an owner.
pub struct SnapshotLoader {
    api: Arc<dyn NotificationApi>,
    limit: usize,
}

impl SnapshotLoader {
    pub fn new(api: Arc<dyn NotificationApi>, limit: usize) -> Self {
        Self { api, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The `limit` most recent notifications for `owner`, newest first.
    pub fn fetch(&self, owner: &OwnerId) -> Result<Vec<Notification>, FetchError> {
        match self.api.list_notifications(owner, self.limit) {
            Ok(records) => {
                tracing::debug!(%owner, count = records.len(), "snapshot fetched");
                Ok(records)
            }
            Err(error) => {
                tracing::warn!(%owner, %error, "snapshot fetch failed");
                Err(error)
            }
        }
    }

    /// Fetch the session's first snapshot and merge it into the store.
    ///
    /// Merging rather than replacing keeps live inserts that arrived before
    /// the snapshot did. If a resync landed first, the snapshot is older than
    /// what the store holds and is dropped. On failure the store is left as
    /// it is.
    pub fn load_initial(
        &self,
        store: &NotificationStore,
        owner: &OwnerId,
        epoch: Epoch,
    ) -> Result<Applied, FetchError> {
        let records = self.fetch(owner)?;
        match store.writer(epoch) {
            Some(mut writer) => {
                if !writer.load_snapshot(records) {
                    tracing::debug!(%owner, %epoch, "initial snapshot superseded by resync");
                    return Ok(Applied::Superseded);
                }
                tracing::info!(%owner, %epoch, unread = writer.view().unread, "initial snapshot loaded");
                Ok(Applied::Applied)
            }
            None => {
                tracing::debug!(%owner, %epoch, "discarding snapshot for stale session");
                Ok(Applied::Stale)
            }
        }
    }

    /// Throw away local state and replace it with a fresh snapshot.
    ///
    /// Concurrent resyncs land in the order they were started: a result that
    /// finishes after a newer one is dropped. On failure the store is left as
    /// it is.
    pub fn resync(
        &self,
        store: &NotificationStore,
        owner: &OwnerId,
        epoch: Epoch,
    ) -> Result<Applied, FetchError> {
        let ticket = store.issue_fetch();
        let records = self.fetch(owner)?;
        match store.writer(epoch) {
            Some(mut writer) => {
                if !writer.resync(ticket, records) {
                    tracing::debug!(%owner, %epoch, %ticket, "resync superseded by a newer one");
                    return Ok(Applied::Superseded);
                }
                tracing::debug!(%owner, %epoch, %ticket, "store resynchronized");
                Ok(Applied::Applied)
            }
            None => {
                tracing::debug!(%owner, %epoch, "discarding resync for stale session");
                Ok(Applied::Stale)
            }
        }
    }
}
