//! Engine configuration.

/// How many notifications a snapshot fetch asks for.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 50;

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Max notifications per snapshot fetch (initial load and resyncs).
    pub snapshot_limit: usize,

    /// Max buffered view updates per watcher before it is dropped.
    pub watch_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            watch_buffer: 256,
        }
    }
}
