//! Per-attribute pending/completed barrier counters.
//!
//! Keyed by fully-qualified attribute name (`"{object}.{attr}"`). A read
//! snapshots `pending` for its dependent keys, then blocks until
//! `completed` has caught up - the mechanism that gives a read observe
//! every write enqueued ahead of it, across processes, without the two
//! sides sharing memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

#[derive(Default)]
pub(crate) struct AtomicPair {
    pending: AtomicU64,
    completed: AtomicU64,
}

pub(crate) type CounterTable = DashMap<String, Arc<AtomicPair>>;

pub(crate) fn bump_pending(table: &CounterTable, key: &str) -> u64 {
    let entry = table
        .entry(key.to_string())
        .or_insert_with(|| Arc::new(AtomicPair::default()));
    entry.pending.fetch_add(1, Ordering::SeqCst) + 1
}

pub(crate) fn read_pending(table: &CounterTable, key: &str) -> u64 {
    table
        .get(key)
        .map(|e| e.pending.load(Ordering::SeqCst))
        .unwrap_or(0)
}

pub(crate) fn bump_completed(table: &CounterTable, key: &str) -> u64 {
    let entry = table
        .entry(key.to_string())
        .or_insert_with(|| Arc::new(AtomicPair::default()));
    entry.completed.fetch_add(1, Ordering::SeqCst) + 1
}

pub(crate) fn read_completed(table: &CounterTable, key: &str) -> u64 {
    table
        .get(key)
        .map(|e| e.completed.load(Ordering::SeqCst))
        .unwrap_or(0)
}

pub(crate) fn snapshot(table: &CounterTable, key: &str) -> (u64, u64) {
    table
        .get(key)
        .map(|e| {
            (
                e.pending.load(Ordering::SeqCst),
                e.completed.load(Ordering::SeqCst),
            )
        })
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_and_completed_track_independently() {
        let table: CounterTable = DashMap::new();
        bump_pending(&table, "obj.attr");
        bump_pending(&table, "obj.attr");
        assert_eq!(snapshot(&table, "obj.attr"), (2, 0));
        bump_completed(&table, "obj.attr");
        assert_eq!(snapshot(&table, "obj.attr"), (2, 1));
    }

    #[test]
    fn unknown_key_reads_as_zero() {
        let table: CounterTable = DashMap::new();
        assert_eq!(snapshot(&table, "nothing.here"), (0, 0));
    }
}
