//! Per-owner push subscription.
//!
//! Assigning an owner starts two workers: a one-shot snapshot fetch and an
//! event pump that holds the feed subscription. Both write into the store
//! through epoch-checked writers, so anything still in flight when the owner
//! changes is discarded instead of leaking into the next session.

use crate::backend::{ChangeFeed, FeedGuard};
use crate::error::{Result, SyncError};
use crate::loader::SnapshotLoader;
use crate::store::NotificationStore;
use crate::types::{ChangeEvent, Epoch, Notification, NotificationId, OwnerId};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Lifecycle of the subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No owner; store empty.
    Unsubscribed,
    /// Owner assigned, feed subscription not established yet.
    Subscribing,
    /// Feed subscription active.
    Live,
}

struct Session {
    owner: OwnerId,
    epoch: Epoch,
    /// Dropping this stops the pump.
    shutdown: Sender<()>,
    pump: Option<JoinHandle<()>>,
}

/// Everything a worker thread needs, detached from the subscriber itself.
#[derive(Clone)]
struct Worker {
    store: Arc<NotificationStore>,
    loader: Arc<SnapshotLoader>,
    state: Arc<Mutex<SessionState>>,
    owner: OwnerId,
    epoch: Epoch,
}

impl Worker {
    fn spawn(self, name: &str, f: impl FnOnce(Worker) + Send + 'static) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || f(self))?;
        Ok(handle)
    }

    fn load_initial(self) {
        // Failure is logged by the loader; the session stays up and the
        // feed keeps delivering.
        let _ = self.loader.load_initial(&self.store, &self.owner, self.epoch);
    }

    fn resync(self) {
        let _ = self.loader.resync(&self.store, &self.owner, self.epoch);
    }

    fn run_pump(self, feed: Arc<dyn ChangeFeed>, shutdown: Receiver<()>) {
        let guard = match FeedGuard::subscribe(feed, &self.owner) {
            Ok(guard) => guard,
            Err(error) => {
                tracing::warn!(owner = %self.owner, %error, "change feed subscription failed");
                return;
            }
        };

        *self.state.lock() = SessionState::Live;
        tracing::info!(owner = %self.owner, epoch = %self.epoch, "change feed live");

        loop {
            select! {
                recv(shutdown) -> _ => break,
                recv(guard.receiver()) -> event => match event {
                    Ok(event) => self.handle(event),
                    Err(_) => {
                        tracing::warn!(owner = %self.owner, "change feed closed by backend");
                        break;
                    }
                },
            }
        }
    }

    fn handle(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Insert { record } => self.apply_insert(record),
            ChangeEvent::Delete { id: Some(id) } => self.apply_delete(&id),
            ChangeEvent::Delete { id: None } => {
                tracing::warn!(owner = %self.owner, error = %SyncError::DegradedEvent, "resynchronizing");
                let spawned = self.clone().spawn("notification-resync", Worker::resync);
                if let Err(error) = spawned {
                    tracing::warn!(owner = %self.owner, %error, "could not start resync");
                }
            }
        }
    }

    fn apply_insert(&self, record: Notification) {
        if record.owner != self.owner {
            tracing::debug!(owner = %self.owner, id = %record.id, "ignoring insert for another owner");
            return;
        }
        let Some(mut writer) = self.store.writer(self.epoch) else {
            return;
        };
        if !writer.merge_incoming(std::slice::from_ref(&record)) {
            tracing::debug!(id = %record.id, "duplicate insert dropped");
        }
    }

    fn apply_delete(&self, id: &NotificationId) {
        if let Some(mut writer) = self.store.writer(self.epoch) {
            writer.remove_by_id(id);
        }
    }
}

/// Keeps the store in sync with one owner's change feed.
pub struct ChangeStreamSubscriber {
    store: Arc<NotificationStore>,
    loader: Arc<SnapshotLoader>,
    feed: Arc<dyn ChangeFeed>,
    state: Arc<Mutex<SessionState>>,
    session: Mutex<Option<Session>>,
}

impl ChangeStreamSubscriber {
    pub fn new(
        store: Arc<NotificationStore>,
        loader: Arc<SnapshotLoader>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self {
            store,
            loader,
            feed,
            state: Arc::new(Mutex::new(SessionState::Unsubscribed)),
            session: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.session.lock().as_ref().map(|s| s.owner.clone())
    }

    /// Start syncing `owner`. A different active owner is torn down first;
    /// the same owner is left running.
    pub fn start(&self, owner: OwnerId) -> Result<()> {
        let mut session = self.session.lock();
        if session.as_ref().is_some_and(|s| s.owner == owner) {
            return Ok(());
        }
        self.teardown(&mut session);

        let epoch = self.store.begin_session(Some(owner.clone()));
        *self.state.lock() = SessionState::Subscribing;
        tracing::info!(%owner, %epoch, "starting notification session");

        let worker = Worker {
            store: Arc::clone(&self.store),
            loader: Arc::clone(&self.loader),
            state: Arc::clone(&self.state),
            owner: owner.clone(),
            epoch,
        };

        let (shutdown, shutdown_rx) = bounded::<()>(0);
        let feed = Arc::clone(&self.feed);
        let started = worker
            .clone()
            .spawn("notification-pump", move |w| w.run_pump(feed, shutdown_rx))
            .and_then(|pump| {
                worker.spawn("notification-snapshot", Worker::load_initial)?;
                Ok(pump)
            });

        let pump = match started {
            Ok(pump) => pump,
            Err(error) => {
                // Whatever did start sees the stale epoch or a closed
                // shutdown channel and exits.
                drop(shutdown);
                self.store.begin_session(None);
                *self.state.lock() = SessionState::Unsubscribed;
                return Err(error);
            }
        };

        *session = Some(Session {
            owner,
            epoch,
            shutdown,
            pump: Some(pump),
        });
        Ok(())
    }

    /// Stop syncing, release the feed subscription and empty the store.
    pub fn stop(&self) {
        let mut session = self.session.lock();
        self.teardown(&mut session);
    }

    /// Re-fetch the snapshot for the active owner and replace the store with
    /// it, on the caller's thread. On failure the store keeps its current
    /// content.
    pub fn refresh(&self) -> Result<()> {
        let (owner, epoch) = {
            let session = self.session.lock();
            let active = session.as_ref().ok_or(SyncError::NoOwner)?;
            (active.owner.clone(), active.epoch)
        };
        self.loader.resync(&self.store, &owner, epoch)?;
        Ok(())
    }

    fn teardown(&self, session: &mut Option<Session>) {
        let Some(mut active) = session.take() else {
            return;
        };

        drop(active.shutdown);
        if let Some(pump) = active.pump.take() {
            if pump.join().is_err() {
                tracing::error!(owner = %active.owner, "notification pump panicked");
            }
        }

        self.store.begin_session(None);
        *self.state.lock() = SessionState::Unsubscribed;
        tracing::info!(owner = %active.owner, epoch = %active.epoch, "notification session stopped");
    }
}

impl Drop for ChangeStreamSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::FetchError;
    use crate::types::Timestamp;
    use std::time::{Duration, Instant};

    fn note(id: &str, owner: &str, t: i64) -> Notification {
        Notification::new(id, owner, "comment", "t", Timestamp(t))
    }

    fn setup() -> (Arc<MemoryBackend>, Arc<NotificationStore>, ChangeStreamSubscriber) {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(NotificationStore::new());
        let loader = Arc::new(SnapshotLoader::new(backend.clone(), 50));
        let subscriber = ChangeStreamSubscriber::new(store.clone(), loader, backend.clone());
        (backend, store, subscriber)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn ids(store: &NotificationStore) -> Vec<String> {
        store.snapshot().iter().map(|n| n.id.0.clone()).collect()
    }

    #[test]
    fn test_start_goes_live_and_loads() {
        let (backend, store, subscriber) = setup();
        backend.seed(vec![note("a", "u1", 1), note("b", "u1", 2)]);

        subscriber.start("u1".into()).unwrap();
        wait_until(|| subscriber.state() == SessionState::Live);
        wait_until(|| store.len() == 2);

        assert_eq!(ids(&store), vec!["b", "a"]);
        assert_eq!(backend.subscriber_count(), 1);
    }

    #[test]
    fn test_stop_releases_subscription() {
        let (backend, store, subscriber) = setup();
        backend.seed(vec![note("a", "u1", 1)]);

        subscriber.start("u1".into()).unwrap();
        wait_until(|| store.len() == 1 && backend.subscriber_count() == 1);

        subscriber.stop();
        assert_eq!(backend.subscriber_count(), 0);
        assert_eq!(subscriber.state(), SessionState::Unsubscribed);
        assert!(store.is_empty());
        assert_eq!(store.owner(), None);
    }

    #[test]
    fn test_restart_same_owner_is_noop() {
        let (backend, store, subscriber) = setup();
        backend.seed(vec![note("a", "u1", 1)]);

        subscriber.start("u1".into()).unwrap();
        wait_until(|| store.len() == 1);
        let epoch = store.epoch();

        subscriber.start("u1".into()).unwrap();
        assert_eq!(store.epoch(), epoch);
        assert_eq!(backend.fetch_count(&"u1".into()), 1);
    }

    #[test]
    fn test_insert_and_delete_events() {
        let (backend, store, subscriber) = setup();
        subscriber.start("u1".into()).unwrap();
        wait_until(|| subscriber.state() == SessionState::Live);

        backend.insert(note("a", "u1", 1));
        backend.insert(note("b", "u1", 2));
        wait_until(|| store.len() == 2);

        backend.delete(&"a".into());
        wait_until(|| store.len() == 1);
        assert_eq!(ids(&store), vec!["b"]);
    }

    #[test]
    fn test_degraded_delete_triggers_resync() {
        let (backend, store, subscriber) = setup();
        backend.seed(vec![note("a", "u1", 3), note("b", "u1", 2), note("c", "u1", 1)]);
        subscriber.start("u1".into()).unwrap();
        wait_until(|| store.len() == 3 && subscriber.state() == SessionState::Live);

        backend.set_degraded_deletes(true);
        backend.delete(&"b".into());

        wait_until(|| store.len() == 2);
        assert_eq!(ids(&store), vec!["a", "c"]);
        assert_eq!(backend.fetch_count(&"u1".into()), 2);
    }

    #[test]
    fn test_subscribe_failure_keeps_snapshot() {
        let (backend, store, subscriber) = setup();
        backend.seed(vec![note("a", "u1", 1)]);
        backend.fail_next_subscribe(FetchError::Unavailable);

        subscriber.start("u1".into()).unwrap();
        wait_until(|| store.len() == 1);
        assert_eq!(subscriber.state(), SessionState::Subscribing);
        assert_eq!(backend.subscriber_count(), 0);
    }

    #[test]
    fn test_refresh_without_owner() {
        let (_backend, _store, subscriber) = setup();
        assert!(matches!(subscriber.refresh(), Err(SyncError::NoOwner)));
    }

    #[test]
    fn test_drop_stops_session() {
        let (backend, store, subscriber) = setup();
        subscriber.start("u1".into()).unwrap();
        wait_until(|| backend.subscriber_count() == 1);

        drop(subscriber);
        assert_eq!(backend.subscriber_count(), 0);
        assert_eq!(store.owner(), None);
    }
}
