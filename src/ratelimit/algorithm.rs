//! Fixed-window counting.

use std::sync::Arc;

use tracing::trace;

use super::clock::Clock;
use super::key::CounterKey;
use super::policy::RateLimitPolicy;
use super::store::CounterStore;
use super::sweeper::SweepHandle;

/// Decides whether one more request from a client on a path exceeds a policy.
pub trait RateLimitAlgorithm: Send + Sync {
    /// Count this request and return `true` if it must be rejected.
    ///
    /// `policy` must have been validated: a zero window or limit is a
    /// precondition violation.
    fn should_reject(&self, identity: &str, path: &str, policy: RateLimitPolicy) -> bool;
}

/// Fixed, absolute-time-aligned windows.
///
/// Time is split into windows of `window_ms` starting at the Unix epoch.
/// Every (client, path, window) triple gets its own counter, and the
/// `max_requests + 1`-th request in a window is the first one rejected.
/// Counts do not carry across a boundary.
///
/// The first request seen in a window files a sweep for records older than
/// two windows. The sweep runs on the [`SweepWorker`](super::SweepWorker)
/// and never delays the decision.
pub struct FixedWindowAlgorithm {
    store: Arc<dyn CounterStore>,
    sweeps: SweepHandle,
    clock: Arc<dyn Clock>,
}

impl FixedWindowAlgorithm {
    /// Create the algorithm over a store, its sweep handle and a clock.
    pub fn new(store: Arc<dyn CounterStore>, sweeps: SweepHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            sweeps,
            clock,
        }
    }

    /// Index of the window containing the current time.
    ///
    /// # Panics
    ///
    /// Panics if `window_ms` is zero.
    pub fn window_index(&self, window_ms: u64) -> u64 {
        self.clock.now_ms() / window_ms
    }
}

impl RateLimitAlgorithm for FixedWindowAlgorithm {
    /// # Panics
    ///
    /// Panics if `policy.window_ms` is zero.
    fn should_reject(&self, identity: &str, path: &str, policy: RateLimitPolicy) -> bool {
        debug_assert!(policy.max_requests > 0, "max_requests must be validated");

        let window = self.window_index(policy.window_ms);
        let key = CounterKey::new(identity, path, window);

        trace!(key = %key, limit = policy.max_requests, "Counting request");

        let count = self.store.increment_and_get(key);

        if count == 1 {
            self.sweeps.request(policy.window_ms.saturating_mul(2));
        }

        count > policy.max_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::store::InMemoryCounterStore;
    use crate::ratelimit::sweeper::SweepWorker;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Store returning a fixed count and recording every call.
    struct ScriptedStore {
        count: u64,
        keys: Mutex<Vec<CounterKey>>,
        sweeps: Mutex<Vec<u64>>,
    }

    impl ScriptedStore {
        fn returning(count: u64) -> Arc<Self> {
            Arc::new(Self {
                count,
                keys: Mutex::new(Vec::new()),
                sweeps: Mutex::new(Vec::new()),
            })
        }
    }

    impl CounterStore for ScriptedStore {
        fn increment_and_get(&self, key: CounterKey) -> u64 {
            self.keys.lock().push(key);
            self.count
        }

        fn sweep(&self, max_age_ms: u64) -> usize {
            self.sweeps.lock().push(max_age_ms);
            0
        }
    }

    fn scripted(count: u64, now_ms: u64) -> (FixedWindowAlgorithm, Arc<ScriptedStore>, SweepWorker) {
        let store = ScriptedStore::returning(count);
        let (sweeps, worker) = SweepWorker::new(store.clone());
        let algorithm =
            FixedWindowAlgorithm::new(store.clone(), sweeps, Arc::new(ManualClock::new(now_ms)));
        (algorithm, store, worker)
    }

    fn in_memory(clock: &ManualClock) -> FixedWindowAlgorithm {
        let store = Arc::new(InMemoryCounterStore::with_clock(Arc::new(clock.clone())));
        FixedWindowAlgorithm::new(store, SweepHandle::disconnected(), Arc::new(clock.clone()))
    }

    #[test]
    fn test_under_limit_is_admitted() {
        let (algorithm, store, _worker) = scripted(3, 0);

        assert!(!algorithm.should_reject("192.168.1.1", "/api/test", RateLimitPolicy::new(1_000, 5)));
        assert_eq!(store.keys.lock().len(), 1);
    }

    #[test]
    fn test_at_limit_is_admitted() {
        let (algorithm, _store, _worker) = scripted(5, 0);
        assert!(!algorithm.should_reject("192.168.1.1", "/api/test", RateLimitPolicy::new(1_000, 5)));
    }

    #[test]
    fn test_over_limit_is_rejected() {
        let (algorithm, _store, _worker) = scripted(6, 0);
        assert!(algorithm.should_reject("192.168.1.1", "/api/test", RateLimitPolicy::new(1_000, 5)));
    }

    #[test]
    fn test_first_request_requests_sweep_of_two_windows() {
        let (algorithm, store, mut worker) = scripted(1, 0);

        algorithm.should_reject("192.168.1.1", "/api/test", RateLimitPolicy::new(1_000, 5));

        assert_eq!(worker.drain(), Some(2_000));
        assert_eq!(*store.sweeps.lock(), vec![2_000]);
    }

    #[test]
    fn test_later_request_does_not_request_sweep() {
        let (algorithm, store, mut worker) = scripted(2, 0);

        algorithm.should_reject("192.168.1.1", "/api/test", RateLimitPolicy::new(1_000, 5));

        assert_eq!(worker.drain(), None);
        assert!(store.sweeps.lock().is_empty());
    }

    #[test]
    fn test_key_is_identity_path_and_window() {
        let (algorithm, store, _worker) = scripted(1, 1_700_000_123_456);

        algorithm.should_reject("192.168.1.1", "/api/test", RateLimitPolicy::new(1_000, 5));

        let keys = store.keys.lock();
        assert_eq!(keys[0], CounterKey::new("192.168.1.1", "/api/test", 1_700_000_123));
        assert_eq!(keys[0].to_string(), "192.168.1.1:/api/test:1700000123");
    }

    #[test]
    fn test_boundary_law() {
        for (window_ms, limit) in [(1_000, 1), (10_000, 5), (60_000, 100)] {
            let clock = ManualClock::new(5 * window_ms);
            let algorithm = in_memory(&clock);
            let policy = RateLimitPolicy::new(window_ms, limit);

            for n in 1..=limit {
                assert!(
                    !algorithm.should_reject("10.0.0.1", "/api", policy),
                    "request {n} of {limit} should be admitted"
                );
            }
            assert!(algorithm.should_reject("10.0.0.1", "/api", policy));
        }
    }

    #[test]
    fn test_window_rollover_resets_count() {
        let clock = ManualClock::new(0);
        let algorithm = in_memory(&clock);
        let policy = RateLimitPolicy::new(10_000, 2);

        // Tail of the first window
        clock.set(9_999);
        assert!(!algorithm.should_reject("10.0.0.1", "/api", policy));
        assert!(!algorithm.should_reject("10.0.0.1", "/api", policy));
        assert!(algorithm.should_reject("10.0.0.1", "/api", policy));

        // Windows are aligned to absolute time, not the first request
        clock.advance(Duration::from_millis(1));
        assert!(!algorithm.should_reject("10.0.0.1", "/api", policy));
        assert!(!algorithm.should_reject("10.0.0.1", "/api", policy));
        assert!(algorithm.should_reject("10.0.0.1", "/api", policy));
    }

    #[test]
    fn test_clients_and_paths_are_counted_separately() {
        let clock = ManualClock::new(0);
        let algorithm = in_memory(&clock);
        let policy = RateLimitPolicy::new(10_000, 1);

        assert!(!algorithm.should_reject("10.0.0.1", "/a", policy));
        assert!(!algorithm.should_reject("10.0.0.2", "/a", policy));
        assert!(!algorithm.should_reject("10.0.0.1", "/b", policy));
        assert!(algorithm.should_reject("10.0.0.1", "/a", policy));
    }

    #[test]
    fn test_window_index() {
        let (algorithm, _store, _worker) = scripted(1, 25_000);
        assert_eq!(algorithm.window_index(10_000), 2);
        assert_eq!(algorithm.window_index(1), 25_000);
    }
}
