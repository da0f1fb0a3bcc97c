//! Deduplicating merge of notification sequences.
//!
//! Every path that grows the store goes through [`merge_incoming`], so the
//! outcome of any interleaving of snapshot loads and push inserts depends only
//! on the set of records seen, not on the order they arrived in.

use crate::types::{Notification, NotificationId};
use std::collections::HashSet;

/// Drop repeated ids, keeping the first occurrence of each.
pub fn dedup(records: impl IntoIterator<Item = Notification>) -> Vec<Notification> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|n| seen.insert(n.id.clone()))
        .collect()
}

/// Stable sort newest-first.
pub fn sort_newest_first(records: &mut [Notification]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Deduplicate and put into canonical order.
pub fn normalize(records: impl IntoIterator<Item = Notification>) -> Vec<Notification> {
    let mut out = dedup(records);
    sort_newest_first(&mut out);
    out
}

/// Merge newly observed records into an existing ordered sequence.
///
/// Records whose id is already present are ignored: they never replace the
/// stored content and never move it. Fresh records are placed ahead of the
/// existing ones and the result is re-sorted newest-first; the sort is stable,
/// so a fresh record sharing a timestamp with a stored one stays in front.
pub fn merge_incoming(existing: &[Notification], incoming: &[Notification]) -> Vec<Notification> {
    let mut seen: HashSet<&NotificationId> = existing.iter().map(|n| &n.id).collect();

    let mut merged: Vec<Notification> = Vec::with_capacity(existing.len() + incoming.len());
    for record in incoming {
        if seen.insert(&record.id) {
            merged.push(record.clone());
        }
    }

    if merged.is_empty() {
        return existing.to_vec();
    }

    merged.extend(existing.iter().cloned());
    sort_newest_first(&mut merged);
    merged
}

/// Number of records with no `read_at`.
pub fn count_unread(records: &[Notification]) -> usize {
    records.iter().filter(|n| n.is_unread()).count()
}
