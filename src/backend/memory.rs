//! In-process backend with push broadcasting and fault injection.

use super::{ChangeFeed, FeedChannel, FeedChannelId, NotificationApi};
use crate::error::{FetchError, MutationError};
use crate::merge;
use crate::types::{ChangeEvent, Notification, NotificationId, OwnerId};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct Subscriber {
    owner: OwnerId,
    sender: Sender<ChangeEvent>,
}

#[derive(Default)]
struct MemoryState {
    /// All rows, every owner.
    rows: Vec<Notification>,
    subscribers: HashMap<FeedChannelId, Subscriber>,
    /// Send delete events without the row id.
    degraded_deletes: bool,
    fail_fetch: Option<FetchError>,
    fail_subscribe: Option<FetchError>,
    fail_delete: Option<MutationError>,
    fail_clear: Option<MutationError>,
    fetch_holds: HashMap<OwnerId, Receiver<()>>,
    response_stalls: HashMap<OwnerId, Receiver<()>>,
    mutation_hold: Option<Receiver<()>>,
    fetch_counts: HashMap<OwnerId, usize>,
}

impl MemoryState {
    fn publish(&mut self, owner: &OwnerId, event: ChangeEvent) {
        self.subscribers.retain(|_, sub| {
            if &sub.owner != owner {
                return true;
            }
            sub.sender.send(event.clone()).is_ok()
        });
    }

    fn delete_event(&self, id: &NotificationId) -> ChangeEvent {
        if self.degraded_deletes {
            ChangeEvent::degraded_delete()
        } else {
            ChangeEvent::delete(id.clone())
        }
    }

    fn remove_row(&mut self, id: &NotificationId) -> Option<Notification> {
        let position = self.rows.iter().position(|n| &n.id == id)?;
        let row = self.rows.remove(position);
        let event = self.delete_event(&row.id);
        self.publish(&row.owner, event);
        Some(row)
    }
}

/// Keeps a held backend call blocked until released or dropped.
pub struct CallGate {
    sender: Option<Sender<()>>,
}

impl CallGate {
    /// Let the held call complete.
    pub fn release(mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(());
        }
    }
}

/// A stand-in for the managed backend: a notifications table plus its change
/// feed, all in memory.
///
/// Writes made through [`insert`](Self::insert), [`delete`](Self::delete) and
/// the [`NotificationApi`] methods are pushed to every open channel for the
/// row's owner, like a row-level change feed would.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    next_channel: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            next_channel: AtomicU64::new(1),
        }
    }

    /// Seed rows without publishing anything.
    pub fn seed(&self, rows: impl IntoIterator<Item = Notification>) {
        self.state.lock().rows.extend(rows);
    }

    /// Create a row server-side and push it.
    pub fn insert(&self, row: Notification) {
        let mut state = self.state.lock();
        let owner = row.owner.clone();
        state.rows.push(row.clone());
        state.publish(&owner, ChangeEvent::insert(row));
    }

    /// Delete a row server-side and push the deletion.
    pub fn delete(&self, id: &NotificationId) -> Option<Notification> {
        self.state.lock().remove_row(id)
    }

    /// Push an arbitrary event to `owner`'s channels without touching rows.
    pub fn emit(&self, owner: &OwnerId, event: ChangeEvent) {
        self.state.lock().publish(owner, event);
    }

    /// Delete events will carry no row id.
    pub fn set_degraded_deletes(&self, degraded: bool) {
        self.state.lock().degraded_deletes = degraded;
    }

    pub fn fail_next_fetch(&self, error: FetchError) {
        self.state.lock().fail_fetch = Some(error);
    }

    pub fn fail_next_subscribe(&self, error: FetchError) {
        self.state.lock().fail_subscribe = Some(error);
    }

    pub fn fail_next_delete(&self, error: MutationError) {
        self.state.lock().fail_delete = Some(error);
    }

    pub fn fail_next_clear(&self, error: MutationError) {
        self.state.lock().fail_clear = Some(error);
    }

    /// Block the next fetch for `owner` until the gate is released.
    pub fn hold_next_fetch(&self, owner: &OwnerId) -> CallGate {
        let (sender, receiver) = bounded(1);
        self.state.lock().fetch_holds.insert(owner.clone(), receiver);
        CallGate {
            sender: Some(sender),
        }
    }

    /// Let the next fetch for `owner` read its rows, then hold the response
    /// until the gate is released.
    ///
    /// Once [`fetch_count`](Self::fetch_count) shows the call, the rows it
    /// returns are fixed.
    pub fn stall_next_response(&self, owner: &OwnerId) -> CallGate {
        let (sender, receiver) = bounded(1);
        self.state.lock().response_stalls.insert(owner.clone(), receiver);
        CallGate {
            sender: Some(sender),
        }
    }

    /// Block the next delete or clear call until the gate is released.
    pub fn hold_next_mutation(&self) -> CallGate {
        let (sender, receiver) = bounded(1);
        self.state.lock().mutation_hold = Some(receiver);
        CallGate {
            sender: Some(sender),
        }
    }

    /// Rows currently stored for `owner`, newest first.
    pub fn rows(&self, owner: &OwnerId) -> Vec<Notification> {
        let state = self.state.lock();
        merge::normalize(state.rows.iter().filter(|n| &n.owner == owner).cloned())
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn fetch_count(&self, owner: &OwnerId) -> usize {
        self.state
            .lock()
            .fetch_counts
            .get(owner)
            .copied()
            .unwrap_or_default()
    }

    fn wait_for_mutation_gate(&self) {
        let hold = self.state.lock().mutation_hold.take();
        if let Some(gate) = hold {
            let _ = gate.recv();
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationApi for MemoryBackend {
    fn list_notifications(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> Result<Vec<Notification>, FetchError> {
        let mut state = self.state.lock();
        *state.fetch_counts.entry(owner.clone()).or_default() += 1;
        let hold = state.fetch_holds.remove(owner);
        if let Some(gate) = hold {
            drop(state);
            let _ = gate.recv();
            state = self.state.lock();
        }

        let result = match state.fail_fetch.take() {
            Some(error) => Err(error),
            None => {
                let mut rows =
                    merge::normalize(state.rows.iter().filter(|n| &n.owner == owner).cloned());
                rows.truncate(limit);
                Ok(rows)
            }
        };

        let stall = state.response_stalls.remove(owner);
        drop(state);
        if let Some(gate) = stall {
            let _ = gate.recv();
        }
        result
    }

    fn delete_notification(&self, id: &NotificationId) -> Result<(), MutationError> {
        self.wait_for_mutation_gate();

        let mut state = self.state.lock();
        if let Some(error) = state.fail_delete.take() {
            return Err(error);
        }
        state.remove_row(id);
        Ok(())
    }

    fn delete_all_notifications(&self, owner: &OwnerId) -> Result<(), MutationError> {
        self.wait_for_mutation_gate();

        let mut state = self.state.lock();
        if let Some(error) = state.fail_clear.take() {
            return Err(error);
        }
        let ids: Vec<NotificationId> = state
            .rows
            .iter()
            .filter(|n| &n.owner == owner)
            .map(|n| n.id.clone())
            .collect();
        for id in &ids {
            state.remove_row(id);
        }
        Ok(())
    }
}

impl ChangeFeed for MemoryBackend {
    fn subscribe(&self, owner: &OwnerId) -> Result<FeedChannel, FetchError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_subscribe.take() {
            return Err(error);
        }

        let id = FeedChannelId(self.next_channel.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = unbounded();
        state.subscribers.insert(
            id,
            Subscriber {
                owner: owner.clone(),
                sender,
            },
        );
        Ok(FeedChannel { id, receiver })
    }

    fn unsubscribe(&self, id: FeedChannelId) {
        self.state.lock().subscribers.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use std::sync::Arc;
    use std::time::Duration;

    fn note(id: &str, owner: &str, t: i64) -> Notification {
        Notification::new(id, owner, "comment", "t", Timestamp(t))
    }

    #[test]
    fn test_list_is_scoped_and_limited() {
        let backend = MemoryBackend::new();
        backend.seed((0..10).map(|i| note(&format!("a{i}"), "u1", i)));
        backend.seed(vec![note("b0", "u2", 100)]);

        let rows = backend.list_notifications(&"u1".into(), 3).unwrap();
        let ids: Vec<&str> = rows.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a9", "a8", "a7"]);
    }

    #[test]
    fn test_push_only_reaches_owner() {
        let backend = MemoryBackend::new();
        let mine = backend.subscribe(&"u1".into()).unwrap();
        let theirs = backend.subscribe(&"u2".into()).unwrap();

        backend.insert(note("a", "u1", 1));

        let event = mine.receiver.recv_timeout(Duration::from_millis(100)).unwrap();
        assert!(matches!(event, ChangeEvent::Insert { .. }));
        assert!(theirs.receiver.try_recv().is_err());
    }

    #[test]
    fn test_degraded_delete_omits_id() {
        let backend = MemoryBackend::new();
        backend.seed(vec![note("a", "u1", 1)]);
        backend.set_degraded_deletes(true);
        let channel = backend.subscribe(&"u1".into()).unwrap();

        backend.delete(&"a".into());

        let event = channel.receiver.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event, ChangeEvent::Delete { id: None });
    }

    #[test]
    fn test_injected_failures_fire_once() {
        let backend = MemoryBackend::new();
        backend.seed(vec![note("a", "u1", 1)]);
        backend.fail_next_delete(MutationError::Transport("timeout".into()));

        assert!(backend.delete_notification(&"a".into()).is_err());
        assert!(backend.delete_notification(&"a".into()).is_ok());
        assert!(backend.rows(&"u1".into()).is_empty());
    }

    #[test]
    fn test_stalled_response_keeps_rows_read() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(vec![note("a", "u1", 1), note("b", "u1", 2)]);
        let gate = backend.stall_next_response(&"u1".into());

        let pending = {
            let backend = backend.clone();
            std::thread::spawn(move || backend.list_notifications(&"u1".into(), 10))
        };
        while backend.fetch_count(&"u1".into()) == 0 {
            std::thread::yield_now();
        }
        backend.delete(&"b".into());
        gate.release();

        let rows = pending.join().unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(backend.rows(&"u1".into()).len(), 1);
    }

    #[test]
    fn test_clear_publishes_each_delete() {
        let backend = MemoryBackend::new();
        backend.seed(vec![note("a", "u1", 1), note("b", "u1", 2), note("c", "u2", 3)]);
        let channel = backend.subscribe(&"u1".into()).unwrap();

        backend.delete_all_notifications(&"u1".into()).unwrap();

        assert_eq!(channel.receiver.len(), 2);
        assert_eq!(backend.rows(&"u2".into()).len(), 1);
    }
}
