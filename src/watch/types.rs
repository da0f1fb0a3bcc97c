//! Watcher types.

use crate::types::NotificationView;

/// Configuration for a watcher.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Max buffered events before dropping the watcher.
    /// Default: 256
    pub buffer_size: usize,

    /// Deliver the current view immediately on subscribe.
    pub emit_current: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            emit_current: true,
        }
    }
}

impl WatchConfig {
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            ..Default::default()
        }
    }
}

/// Events delivered to watchers.
#[derive(Clone, Debug)]
pub enum ViewEvent {
    /// The store changed; `view` is the state right after the change.
    Changed { view: NotificationView },

    /// Watcher was dropped.
    Dropped { reason: DropReason },
}

impl ViewEvent {
    pub fn view(&self) -> Option<&NotificationView> {
        match self {
            ViewEvent::Changed { view } => Some(view),
            ViewEvent::Dropped { .. } => None,
        }
    }
}

/// Why a watcher was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unwatched.
    Unwatched,
}

/// Unique identifier for a watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Handle to receive view updates.
pub struct WatchHandle {
    pub id: WatchId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<ViewEvent>,
}

impl WatchHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ViewEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ViewEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ViewEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered and return the newest view, if any.
    pub fn latest(&self) -> Option<NotificationView> {
        let mut latest = None;
        while let Ok(event) = self.receiver.try_recv() {
            if let ViewEvent::Changed { view } = event {
                latest = Some(view);
            }
        }
        latest
    }
}
