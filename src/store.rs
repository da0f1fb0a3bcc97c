//! In-memory notification store.
//!
//! The record set sits behind a single mutex. Every mutation runs as one
//! lock acquisition (read, compute, write, broadcast), so concurrent writers
//! never interleave a read-modify-write. The unread counter is recomputed from
//! the records on every write and is published together with them.

use crate::merge;
use crate::types::{Epoch, FetchTicket, Notification, NotificationId, NotificationView, OwnerId};
use crate::watch::{WatchConfig, WatchHandle, WatchId, WatchManager};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::sync::Arc;

struct StoreState {
    owner: Option<OwnerId>,
    epoch: Epoch,
    records: Arc<[Notification]>,
    unread: usize,
    /// Ids removed while the session's first snapshot is still outstanding.
    /// `None` once that snapshot has landed.
    tombstones: Option<HashSet<NotificationId>>,
    /// Last ticket handed out to a snapshot fetch this session.
    issued: FetchTicket,
    /// Ticket of the most recent fetch result written to the store.
    applied: FetchTicket,
}

impl StoreState {
    fn new() -> Self {
        Self {
            owner: None,
            epoch: Epoch::default(),
            records: Arc::from(Vec::new()),
            unread: 0,
            tombstones: None,
            issued: FetchTicket::default(),
            applied: FetchTicket::default(),
        }
    }

    fn view(&self) -> NotificationView {
        NotificationView {
            owner: self.owner.clone(),
            epoch: self.epoch,
            records: Arc::clone(&self.records),
            unread: self.unread,
        }
    }
}

/// The authoritative client-side view of one owner's notifications.
pub struct NotificationStore {
    state: Mutex<StoreState>,
    watchers: WatchManager,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::new()),
            watchers: WatchManager::new(),
        }
    }

    // --- Session ---

    /// Reset the store for a new owner (or for no owner) and bump the epoch.
    ///
    /// Writers holding the previous epoch are rejected from here on.
    pub fn begin_session(&self, owner: Option<OwnerId>) -> Epoch {
        let mut writer = self.write();
        let state = &mut *writer.guard;
        state.epoch = state.epoch.next();
        state.tombstones = owner.as_ref().map(|_| HashSet::new());
        state.issued = FetchTicket::FIRST;
        state.applied = FetchTicket::default();
        state.owner = owner;
        let epoch = state.epoch;
        writer.commit(Vec::new());
        epoch
    }

    pub fn epoch(&self) -> Epoch {
        self.state.lock().epoch
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.state.lock().owner.clone()
    }

    /// Lock the store for writing under the current epoch.
    pub fn write(&self) -> StoreWriter<'_> {
        StoreWriter {
            guard: self.state.lock(),
            watchers: &self.watchers,
            dirty: false,
        }
    }

    /// Lock the store for writing, provided the session is still at `epoch`.
    ///
    /// Returns `None` when the owner has changed since `epoch` was taken;
    /// the caller's result belongs to a dead session and must be dropped.
    pub fn writer(&self, epoch: Epoch) -> Option<StoreWriter<'_>> {
        let writer = self.write();
        (writer.guard.epoch == epoch).then_some(writer)
    }

    /// Order a resync fetch after every fetch started before it.
    ///
    /// Take the ticket before calling the backend; the result is later
    /// applied through [`StoreWriter::resync`].
    pub fn issue_fetch(&self) -> FetchTicket {
        let mut state = self.state.lock();
        state.issued = state.issued.next();
        state.issued
    }

    // --- Mutations (current epoch) ---

    /// Replace all records with the normalized input.
    pub fn initialize(&self, records: Vec<Notification>) {
        self.write().initialize(records);
    }

    /// Merge newly observed records. Returns true if anything was added.
    pub fn merge_incoming(&self, records: &[Notification]) -> bool {
        self.write().merge_incoming(records)
    }

    /// Remove a record by id. Absent ids are ignored.
    pub fn remove_by_id(&self, id: &NotificationId) -> Option<Notification> {
        self.write().remove_by_id(id)
    }

    /// Empty the record set.
    pub fn reset(&self) {
        self.write().reset();
    }

    // --- Reads ---

    /// Current records and unread count, taken under one lock.
    pub fn snapshot(&self) -> NotificationView {
        self.state.lock().view()
    }

    pub fn unread_count(&self) -> usize {
        self.state.lock().unread
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.state.lock().records.iter().any(|n| &n.id == id)
    }

    // --- Watchers ---

    /// Observe every change to the store.
    pub fn watch(&self, config: WatchConfig) -> WatchHandle {
        // Hold the state lock so no change slips between the initial view
        // and registration.
        let state = self.state.lock();
        self.watchers.watch(config, state.view())
    }

    pub fn unwatch(&self, id: WatchId) {
        self.watchers.unwatch(id);
    }

    pub fn watch_count(&self) -> usize {
        self.watchers.watch_count()
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive write access to the store.
///
/// Watchers are notified once, when the writer is dropped, if anything
/// observable changed.
pub struct StoreWriter<'a> {
    guard: MutexGuard<'a, StoreState>,
    watchers: &'a WatchManager,
    dirty: bool,
}

impl StoreWriter<'_> {
    fn commit(&mut self, records: Vec<Notification>) {
        self.guard.unread = merge::count_unread(&records);
        self.guard.records = Arc::from(records);
        self.dirty = true;
    }

    pub fn epoch(&self) -> Epoch {
        self.guard.epoch
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        self.guard.owner.as_ref()
    }

    pub fn view(&self) -> NotificationView {
        self.guard.view()
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.guard.records.iter().any(|n| &n.id == id)
    }

    /// Replace all records with the normalized input.
    pub fn initialize(&mut self, records: Vec<Notification>) {
        self.guard.tombstones = None;
        self.commit(merge::normalize(records));
    }

    /// Merge newly observed records. Returns true if anything was added.
    pub fn merge_incoming(&mut self, records: &[Notification]) -> bool {
        let before = self.guard.records.len();
        let merged = merge::merge_incoming(&self.guard.records, records);
        if merged.len() == before {
            return false;
        }
        self.commit(merged);
        true
    }

    /// True once the result of a fetch started after `ticket` is in the store.
    pub fn is_superseded(&self, ticket: FetchTicket) -> bool {
        ticket <= self.guard.applied
    }

    /// Merge the session's first snapshot.
    ///
    /// Records removed while the snapshot was in flight are filtered out so a
    /// slow snapshot cannot bring them back. Returns false, leaving the store
    /// untouched, when a resync has already replaced the set.
    pub fn load_snapshot(&mut self, records: Vec<Notification>) -> bool {
        if self.is_superseded(FetchTicket::FIRST) {
            return false;
        }
        self.guard.applied = FetchTicket::FIRST;

        let records: Vec<Notification> = match self.guard.tombstones.take() {
            Some(tombstones) if !tombstones.is_empty() => records
                .into_iter()
                .filter(|n| !tombstones.contains(&n.id))
                .collect(),
            _ => records,
        };
        self.merge_incoming(&records);
        true
    }

    /// Replace the set with the result of the fetch holding `ticket`.
    ///
    /// Returns false, leaving the store untouched, when a fetch started later
    /// has already been applied.
    pub fn resync(&mut self, ticket: FetchTicket, records: Vec<Notification>) -> bool {
        if self.is_superseded(ticket) {
            return false;
        }
        self.guard.applied = ticket;
        self.initialize(records);
        true
    }

    /// Remove a record by id. Absent ids are ignored.
    pub fn remove_by_id(&mut self, id: &NotificationId) -> Option<Notification> {
        if let Some(tombstones) = self.guard.tombstones.as_mut() {
            tombstones.insert(id.clone());
        }

        let position = self.guard.records.iter().position(|n| &n.id == id)?;
        let mut records = self.guard.records.to_vec();
        let removed = records.remove(position);
        self.commit(records);
        Some(removed)
    }

    /// Empty the record set. Owner and epoch are kept.
    pub fn reset(&mut self) {
        if self.guard.records.is_empty() {
            return;
        }
        self.commit(Vec::new());
    }

    /// Put back an exact earlier view of the records, order included.
    pub fn restore(&mut self, view: &NotificationView) {
        self.guard.unread = view.unread;
        self.guard.records = Arc::clone(&view.records);
        self.dirty = true;
    }
}

impl Drop for StoreWriter<'_> {
    fn drop(&mut self) {
        if self.dirty {
            // Still under the lock, so watchers see changes in write order.
            self.watchers.broadcast(&self.guard.view());
        }
    }
}
