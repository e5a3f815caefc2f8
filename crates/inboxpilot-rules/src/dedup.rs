//! Deduplication cache — collapses bursts of webhook deliveries for the same
//! task into one processed event.
//!
//! Sliding window: the timer restarts from the last *processed* occurrence,
//! so a steady trickle of events further apart than the window is always
//! processed while a burst collapses to one. Bounded: entries expire after a
//! TTL and the map is hard-capped, oldest first.
//!
//! Best-effort only — two events racing through the scheduling gap can still
//! both pass; the per-task lock in the executor is what serializes mutations.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Entries older than `window * TTL_FACTOR` are dropped entirely.
const TTL_FACTOR: i32 = 8;

pub struct DedupCache {
    window: Duration,
    max_entries: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Insertion-ordered (timestamp, task id) pairs driving eviction.
    /// May hold stale pairs for refreshed entries; eviction skips those.
    order: VecDeque<(DateTime<Utc>, String)>,
}

struct Entry {
    last_processed: DateTime<Utc>,
    occurrences: u32,
}

impl DedupCache {
    pub fn new(window_secs: u64, max_entries: usize) -> Self {
        Self {
            window: Duration::seconds(window_secs as i64),
            max_entries,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Record a sighting of `task_id` and decide whether to process it.
    pub fn should_process(&self, task_id: &str, now: DateTime<Utc>) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        let fresh = match inner.entries.get_mut(task_id) {
            Some(entry) if now - entry.last_processed < self.window => {
                entry.occurrences += 1;
                false
            }
            Some(entry) => {
                entry.last_processed = now;
                entry.occurrences = 1;
                inner.order.push_back((now, task_id.to_string()));
                true
            }
            None => {
                inner.entries.insert(
                    task_id.to_string(),
                    Entry {
                        last_processed: now,
                        occurrences: 1,
                    },
                );
                inner.order.push_back((now, task_id.to_string()));
                true
            }
        };

        self.evict(inner, now);
        fresh
    }

    /// How many times the task was seen in its current window. Zero when the
    /// task is untracked.
    pub fn occurrences(&self, task_id: &str) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(task_id).map_or(0, |e| e.occurrences)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(&self, inner: &mut Inner, now: DateTime<Utc>) {
        let ttl = self.window * TTL_FACTOR;
        while let Some((stamp, id)) = inner.order.front() {
            let expired = now - *stamp >= ttl;
            let over_cap = inner.entries.len() > self.max_entries;
            if !expired && !over_cap {
                break;
            }
            let stamp = *stamp;
            let id = id.clone();
            inner.order.pop_front();
            // A refreshed entry left a stale pair behind; only drop the map
            // entry when this pair is its live one.
            if inner
                .entries
                .get(&id)
                .is_some_and(|e| e.last_processed == stamp)
            {
                inner.entries.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    #[test]
    fn test_first_sight_is_processed() {
        let cache = DedupCache::new(5, 100);
        assert!(cache.should_process("t1", t0()));
        assert_eq!(cache.occurrences("t1"), 1);
    }

    #[test]
    fn test_burst_collapses_to_one() {
        let cache = DedupCache::new(5, 100);
        assert!(cache.should_process("t1", at(0)));
        assert!(!cache.should_process("t1", at(1)));
        assert!(!cache.should_process("t1", at(4)));
        assert_eq!(cache.occurrences("t1"), 3);
    }

    #[test]
    fn test_window_slides_from_last_processed() {
        let cache = DedupCache::new(5, 100);
        assert!(cache.should_process("t1", at(0)));
        // Suppressed events do not move the window.
        assert!(!cache.should_process("t1", at(4)));
        // Five seconds after the *processed* event: fresh again.
        assert!(cache.should_process("t1", at(5)));
        assert_eq!(cache.occurrences("t1"), 1);
        // And the new window anchors at t=5, not t=0 or t=4.
        assert!(!cache.should_process("t1", at(9)));
        assert!(cache.should_process("t1", at(10)));
    }

    #[test]
    fn test_steady_trickle_always_processed() {
        let cache = DedupCache::new(5, 100);
        for i in 0..5 {
            assert!(cache.should_process("t1", at(i * 6)));
        }
    }

    #[test]
    fn test_distinct_tasks_do_not_interfere() {
        let cache = DedupCache::new(5, 100);
        assert!(cache.should_process("t1", at(0)));
        assert!(cache.should_process("t2", at(1)));
        assert!(!cache.should_process("t1", at(2)));
    }

    #[test]
    fn test_hard_cap_evicts_oldest() {
        let cache = DedupCache::new(5, 2);
        assert!(cache.should_process("t1", at(0)));
        assert!(cache.should_process("t2", at(1)));
        assert!(cache.should_process("t3", at(2)));
        assert!(cache.len() <= 2);
        assert_eq!(cache.occurrences("t1"), 0);
    }

    #[test]
    fn test_ttl_eviction() {
        let cache = DedupCache::new(5, 100);
        assert!(cache.should_process("t1", at(0)));
        // 8x the window later the entry is gone, not just expired.
        assert!(cache.should_process("t2", at(41)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.occurrences("t1"), 0);
    }

    #[test]
    fn test_refreshed_entry_survives_stale_queue_pair() {
        let cache = DedupCache::new(5, 100);
        assert!(cache.should_process("t1", at(0)));
        assert!(cache.should_process("t1", at(6)));
        // The t=0 pair expires at t=40 but the entry was refreshed at t=6,
        // so it must survive until its own TTL.
        assert!(cache.should_process("t2", at(41)));
        assert_eq!(cache.occurrences("t1"), 1);
    }
}
