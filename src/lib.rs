//! # Notification Sync
//!
//! Client-side synchronization of a user's notifications against a managed
//! backend: a bounded snapshot and a live push feed merged into one
//! deduplicated, newest-first view, plus optimistic dismiss and clear-all.
//!
//! ## Core Concepts
//!
//! - **Store**: the single in-memory record set, unique by id, with a derived
//!   unread count
//! - **Merge**: id-keyed merge that makes arrival order irrelevant
//! - **Session**: one owner at a time; switching owners bumps an epoch that
//!   invalidates every result still in flight for the previous one
//! - **Mutations**: optimistic locally, then resync (dismiss) or rollback
//!   (clear-all) if the backend refuses
//!
//! ## Example
//!
//! ```ignore
//! use notification_sync::{MemoryBackend, NotificationSync, SyncConfig};
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let sync = NotificationSync::with_backend(backend, SyncConfig::default());
//!
//! sync.start("user-1".into())?;
//! let watch = sync.watch();
//!
//! // Later
//! let view = sync.view();
//! println!("{} unread of {}", view.unread, view.len());
//! sync.remove_one(&view.records[0].id)?;
//! ```

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod loader;
pub mod merge;
pub mod service;
pub mod store;
pub mod subscriber;
pub mod types;
pub mod watch;

// Re-exports
pub use backend::{
    ChangeFeed, FeedChannel, FeedChannelId, FeedGuard, MemoryBackend, NotificationApi,
};
pub use config::{SyncConfig, DEFAULT_SNAPSHOT_LIMIT};
pub use coordinator::MutationCoordinator;
pub use error::{FetchError, MetadataError, MutationError, Result, SyncError};
pub use loader::{Applied, SnapshotLoader};
pub use service::NotificationSync;
pub use store::{NotificationStore, StoreWriter};
pub use subscriber::{ChangeStreamSubscriber, SessionState};
pub use types::*;
pub use watch::{DropReason, ViewEvent, WatchConfig, WatchHandle, WatchId, WatchManager};
