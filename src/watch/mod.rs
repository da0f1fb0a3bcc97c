//! Reactive watchers for store changes.
//!
//! Consumers (an unread badge, a dropdown list) receive a fresh
//! [`NotificationView`](crate::types::NotificationView) after every
//! observable change to the store.
//!
//! Watchers support:
//! - An initial view on subscribe so the consumer starts consistent
//! - Bounded buffers with slow-watcher dropping (writers never block)
//!
//! # Example
//!
//! ```ignore
//! let handle = store.watch(WatchConfig::default());
//!
//! loop {
//!     match handle.recv() {
//!         Ok(ViewEvent::Changed { view }) => println!("{} unread", view.unread),
//!         Ok(ViewEvent::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::WatchManager;
pub use types::{DropReason, ViewEvent, WatchConfig, WatchHandle, WatchId};
