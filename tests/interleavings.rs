//! Randomized interleavings of store writes.

use notification_sync::{merge, Notification, NotificationId, NotificationStore, Timestamp};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

/// Same id always carries the same content, like rows coming from one table.
fn record(id: usize) -> Notification {
    let n = Notification::new(
        format!("n{id}"),
        "u1",
        "comment",
        format!("title {id}"),
        Timestamp(id as i64 * 10),
    );
    if id % 3 == 0 {
        n.read(Timestamp(1_000))
    } else {
        n
    }
}

#[derive(Clone, Debug)]
enum Op {
    Initialize(Vec<usize>),
    Merge(Vec<usize>),
    Remove(usize),
    Reset,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => prop::collection::vec(0usize..12, 0..8).prop_map(Op::Initialize),
        4 => prop::collection::vec(0usize..12, 0..4).prop_map(Op::Merge),
        3 => (0usize..12).prop_map(Op::Remove),
        1 => Just(Op::Reset),
    ]
}

fn apply(store: &NotificationStore, op: &Op) {
    match op {
        Op::Initialize(ids) => store.initialize(ids.iter().map(|&i| record(i)).collect()),
        Op::Merge(ids) => {
            let batch: Vec<Notification> = ids.iter().map(|&i| record(i)).collect();
            store.merge_incoming(&batch);
        }
        Op::Remove(id) => {
            store.remove_by_id(&NotificationId::new(format!("n{id}")));
        }
        Op::Reset => store.reset(),
    }
}

fn assert_invariants(store: &NotificationStore) {
    let view = store.snapshot();

    let unique: HashSet<&NotificationId> = view.iter().map(|n| &n.id).collect();
    assert_eq!(unique.len(), view.len(), "duplicate ids in {:?}", view.ids());

    assert!(
        view.records
            .windows(2)
            .all(|w| w[0].created_at >= w[1].created_at),
        "not newest-first: {:?}",
        view.ids()
    );

    let unread = view.iter().filter(|n| n.is_unread()).count();
    assert_eq!(view.unread, unread);
}

proptest! {
    #[test]
    fn prop_invariants_hold_after_every_op(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let store = NotificationStore::new();
        for op in &ops {
            apply(&store, op);
            assert_invariants(&store);
        }
    }

    #[test]
    fn prop_delivery_order_does_not_matter(
        (first, second) in prop::collection::vec(0usize..15, 0..30)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let a = NotificationStore::new();
        let b = NotificationStore::new();
        for &id in &first {
            a.merge_incoming(&[record(id)]);
        }
        for &id in &second {
            b.merge_incoming(&[record(id)]);
        }

        prop_assert_eq!(a.snapshot().ids(), b.snapshot().ids());
        prop_assert_eq!(a.unread_count(), b.unread_count());
    }

    #[test]
    fn prop_latest_started_fetch_wins(
        (results, order) in prop::collection::vec(prop::collection::vec(0usize..12, 0..6), 1..6)
            .prop_flat_map(|results| {
                let n = results.len();
                (Just(results), Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
            }),
        first_snapshot in prop::collection::vec(0usize..12, 0..6),
        snapshot_at in 0usize..6,
    ) {
        let store = NotificationStore::new();
        store.begin_session(Some("u1".into()));
        let tickets: Vec<_> = results.iter().map(|_| store.issue_fetch()).collect();

        // Resyncs finish in any order, the first snapshot somewhere among them
        let snapshot_at = snapshot_at.min(order.len());
        for (position, &i) in order.iter().enumerate() {
            if position == snapshot_at {
                store.write().load_snapshot(first_snapshot.iter().map(|&id| record(id)).collect());
            }
            store.write().resync(tickets[i], results[i].iter().map(|&id| record(id)).collect());
            assert_invariants(&store);
        }
        if snapshot_at == order.len() {
            store.write().load_snapshot(first_snapshot.iter().map(|&id| record(id)).collect());
        }

        let latest = results.last().cloned().unwrap_or_default();
        let expected: Vec<NotificationId> = merge::normalize(latest.into_iter().map(record))
            .into_iter()
            .map(|n| n.id)
            .collect();
        prop_assert_eq!(store.snapshot().ids(), expected);
    }

    #[test]
    fn prop_snapshot_and_inserts_converge(
        snapshot in prop::collection::vec(0usize..15, 0..10),
        inserts in prop::collection::vec(0usize..15, 0..10),
        split in 0usize..10,
    ) {
        let snapshot: Vec<Notification> = merge::normalize(snapshot.into_iter().map(record));
        let inserts: Vec<Notification> = inserts.into_iter().map(record).collect();
        let split = split.min(inserts.len());

        // Some inserts before the snapshot lands, the rest after
        let store = NotificationStore::new();
        for n in &inserts[..split] {
            store.merge_incoming(std::slice::from_ref(n));
        }
        store.merge_incoming(&snapshot);
        for n in &inserts[split..] {
            store.merge_incoming(std::slice::from_ref(n));
        }

        let mut all = snapshot.clone();
        all.extend(inserts.iter().cloned());
        let expected: Vec<NotificationId> =
            merge::normalize(all).into_iter().map(|n| n.id).collect();
        prop_assert_eq!(store.snapshot().ids(), expected);
    }
}

#[test]
fn test_concurrent_writers_keep_invariants() {
    let store = Arc::new(NotificationStore::new());

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let id = (w * 7 + i) % 25;
                    match i % 4 {
                        0 | 1 => {
                            store.merge_incoming(&[record(id)]);
                        }
                        2 => {
                            store.remove_by_id(&NotificationId::new(format!("n{id}")));
                        }
                        _ => assert_invariants(&store),
                    }
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    assert_invariants(&store);
}
