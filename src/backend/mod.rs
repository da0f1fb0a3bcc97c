//! Collaborator interfaces for the managed backend.
//!
//! The engine never talks to the network itself. It is handed a
//! [`NotificationApi`] for bulk reads and deletes and a [`ChangeFeed`] for the
//! push channel; [`MemoryBackend`] implements both in-process.

mod memory;

pub use memory::{CallGate, MemoryBackend};

use crate::error::{FetchError, MutationError};
use crate::types::{ChangeEvent, Notification, NotificationId, OwnerId};
use crossbeam_channel::Receiver;
use std::sync::Arc;

/// Request/response side of the backend.
pub trait NotificationApi: Send + Sync {
    /// The `limit` most recent notifications for `owner`, newest first.
    fn list_notifications(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> Result<Vec<Notification>, FetchError>;

    fn delete_notification(&self, id: &NotificationId) -> Result<(), MutationError>;

    fn delete_all_notifications(&self, owner: &OwnerId) -> Result<(), MutationError>;
}

/// Identifier of an open push channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FeedChannelId(pub u64);

/// An open push channel scoped to one owner.
pub struct FeedChannel {
    pub id: FeedChannelId,
    pub receiver: Receiver<ChangeEvent>,
}

/// Push side of the backend.
pub trait ChangeFeed: Send + Sync {
    /// Open a channel delivering changes to `owner`'s notifications.
    fn subscribe(&self, owner: &OwnerId) -> Result<FeedChannel, FetchError>;

    /// Close a channel. Unknown ids are ignored.
    fn unsubscribe(&self, id: FeedChannelId);
}

/// Open push channel that is closed when dropped.
pub struct FeedGuard {
    feed: Arc<dyn ChangeFeed>,
    channel: FeedChannel,
    owner: OwnerId,
}

impl FeedGuard {
    pub fn subscribe(feed: Arc<dyn ChangeFeed>, owner: &OwnerId) -> Result<Self, FetchError> {
        let channel = feed.subscribe(owner)?;
        tracing::debug!(%owner, channel = channel.id.0, "change feed subscribed");
        Ok(Self {
            feed,
            channel,
            owner: owner.clone(),
        })
    }

    pub fn id(&self) -> FeedChannelId {
        self.channel.id
    }

    pub fn receiver(&self) -> &Receiver<ChangeEvent> {
        &self.channel.receiver
    }
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.feed.unsubscribe(self.channel.id);
        tracing::debug!(owner = %self.owner, channel = self.channel.id.0, "change feed unsubscribed");
    }
}
