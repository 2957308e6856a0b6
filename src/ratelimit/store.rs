//! Concurrent counter storage with age-based expiry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use super::clock::{Clock, SystemClock};
use super::key::CounterKey;

/// Storage capability for per-window request counters.
///
/// Implementations must linearize increments on a single key: the count
/// returned by [`increment_and_get`](CounterStore::increment_and_get) always
/// includes the increment just performed and every increment that completed
/// before it. A missing key is the zero-count state, never an error.
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key`, creating it at 1 if absent, and
    /// return the resulting count.
    fn increment_and_get(&self, key: CounterKey) -> u64;

    /// Remove every record created strictly before `now - max_age_ms`.
    ///
    /// Returns the number of removed records.
    fn sweep(&self, max_age_ms: u64) -> usize;
}

/// A single counter record.
///
/// The creation time is fixed on insert and is not refreshed by later
/// increments.
#[derive(Debug)]
struct CounterRecord {
    created_at_ms: u64,
    count: AtomicU64,
}

/// In-memory [`CounterStore`] backed by a sharded concurrent map.
///
/// Increments on an existing key only take a shard read lock and bump an
/// atomic; creating a key or sweeping takes the shard write lock, so a
/// sweep never holds more than one shard at a time.
pub struct InMemoryCounterStore {
    records: DashMap<CounterKey, CounterRecord>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    /// Create an empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create an empty store that timestamps records with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment_and_get(&self, key: CounterKey) -> u64 {
        if let Some(record) = self.records.get(&key) {
            return record.count.fetch_add(1, Ordering::AcqRel) + 1;
        }

        let record = self.records.entry(key).or_insert_with(|| CounterRecord {
            created_at_ms: self.clock.now_ms(),
            count: AtomicU64::new(0),
        });
        record.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn sweep(&self, max_age_ms: u64) -> usize {
        let cutoff = self.clock.now_ms().saturating_sub(max_age_ms);
        let mut removed = 0;

        self.records.retain(|_, record| {
            let live = record.created_at_ms >= cutoff;
            if !live {
                removed += 1;
            }
            live
        });

        trace!(cutoff_ms = cutoff, removed = removed, "Swept counter store");
        removed
    }
}
