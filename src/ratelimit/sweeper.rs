//! Background expiry of counter records.
//!
//! The decision path never sweeps inline. It files a request through a
//! [`SweepHandle`], which never blocks, and a single [`SweepWorker`] performs
//! the sweep off the request path, on tokio's blocking pool.
//!
//! Requests that arrive while the queue is full are dropped. Queued requests
//! coalesce to the largest age, so a dropped request asking for a smaller age
//! is not honored by the pending sweep; records it would have removed stay
//! until a later first-of-window request or the periodic sweep.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use super::store::CounterStore;

/// Pending sweep requests held before new ones are dropped.
const SWEEP_QUEUE_CAPACITY: usize = 64;

/// Cheap, cloneable handle used to request a sweep.
#[derive(Debug, Clone)]
pub struct SweepHandle {
    tx: mpsc::Sender<u64>,
}

impl SweepHandle {
    /// A handle with no worker behind it. Every request is dropped.
    pub fn disconnected() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }

    /// Ask the worker to remove records older than `max_age_ms`.
    ///
    /// Never blocks and never fails from the caller's point of view.
    pub fn request(&self, max_age_ms: u64) {
        match self.tx.try_send(max_age_ms) {
            Ok(()) => trace!(max_age_ms = max_age_ms, "Sweep requested"),
            Err(TrySendError::Full(_)) => {
                trace!(max_age_ms = max_age_ms, "Sweep queue full, request dropped")
            }
            Err(TrySendError::Closed(_)) => {
                trace!(max_age_ms = max_age_ms, "Sweep worker gone, request dropped")
            }
        }
    }
}

/// Consumes sweep requests and applies them to one counter store.
pub struct SweepWorker {
    store: Arc<dyn CounterStore>,
    rx: mpsc::Receiver<u64>,
}

impl SweepWorker {
    /// Create a worker for `store` and the handle that feeds it.
    pub fn new(store: Arc<dyn CounterStore>) -> (SweepHandle, Self) {
        let (tx, rx) = mpsc::channel(SWEEP_QUEUE_CAPACITY);
        (SweepHandle { tx }, Self { store, rx })
    }

    /// Run every pending request now, on the calling thread.
    ///
    /// Pending requests are coalesced into a single sweep with the largest
    /// requested age. Returns that age, or `None` if nothing was pending.
    pub fn drain(&mut self) -> Option<u64> {
        let first = self.rx.try_recv().ok()?;
        let max_age_ms = self.coalesce(first);
        self.sweep(max_age_ms);
        Some(max_age_ms)
    }

    /// Serve requests until every [`SweepHandle`] is dropped.
    pub async fn run(mut self) {
        debug!("Sweep worker started");

        while let Some(first) = self.rx.recv().await {
            let max_age_ms = self.coalesce(first);
            sweep_blocking(Arc::clone(&self.store), max_age_ms).await;
        }

        debug!("Sweep worker stopped");
    }

    /// Like [`run`](Self::run), but also sweeps with `periodic_max_age_ms`
    /// every `interval` so idle stores are reclaimed without traffic.
    pub async fn run_with_interval(mut self, interval: Duration, periodic_max_age_ms: u64) {
        debug!(
            interval_ms = interval.as_millis() as u64,
            max_age_ms = periodic_max_age_ms,
            "Sweep worker started with periodic sweep"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            let max_age_ms = tokio::select! {
                biased;
                _ = ticker.tick() => periodic_max_age_ms,
                request = self.rx.recv() => match request {
                    Some(first) => self.coalesce(first),
                    None => break,
                },
            };
            sweep_blocking(Arc::clone(&self.store), max_age_ms).await;
        }

        debug!("Sweep worker stopped");
    }

    /// Spawn [`run`](Self::run) on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Spawn [`run_with_interval`](Self::run_with_interval) on the current
    /// tokio runtime.
    pub fn spawn_with_interval(self, interval: Duration, max_age_ms: u64) -> JoinHandle<()> {
        tokio::spawn(self.run_with_interval(interval, max_age_ms))
    }

    /// Fold every queued request into `first`, keeping the largest age so
    /// no requester's records are swept earlier than it asked.
    fn coalesce(&mut self, first: u64) -> u64 {
        let mut max_age_ms = first;
        while let Ok(next) = self.rx.try_recv() {
            max_age_ms = max_age_ms.max(next);
        }
        max_age_ms
    }

    fn sweep(&self, max_age_ms: u64) {
        sweep_store(self.store.as_ref(), max_age_ms);
    }
}

/// Sweep on the blocking pool; a full `retain` pass over a large store must
/// not hold a runtime worker thread.
async fn sweep_blocking(store: Arc<dyn CounterStore>, max_age_ms: u64) {
    let task = tokio::task::spawn_blocking(move || sweep_store(store.as_ref(), max_age_ms));
    if let Err(e) = task.await {
        warn!(max_age_ms = max_age_ms, error = %e, "Counter sweep task failed");
    }
}

fn sweep_store(store: &dyn CounterStore, max_age_ms: u64) {
    match panic::catch_unwind(AssertUnwindSafe(|| store.sweep(max_age_ms))) {
        Ok(removed) if removed > 0 => {
            debug!(max_age_ms = max_age_ms, removed = removed, "Expired counters removed")
        }
        Ok(_) => {}
        Err(_) => warn!(max_age_ms = max_age_ms, "Counter sweep panicked, continuing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::key::CounterKey;
    use crate::ratelimit::store::InMemoryCounterStore;
    use crate::ratelimit::clock::ManualClock;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        sweeps: Mutex<Vec<u64>>,
    }

    impl CounterStore for RecordingStore {
        fn increment_and_get(&self, _key: CounterKey) -> u64 {
            1
        }

        fn sweep(&self, max_age_ms: u64) -> usize {
            self.sweeps.lock().push(max_age_ms);
            0
        }
    }

    struct PanickingStore;

    impl CounterStore for PanickingStore {
        fn increment_and_get(&self, _key: CounterKey) -> u64 {
            1
        }

        fn sweep(&self, _max_age_ms: u64) -> usize {
            panic!("sweep failed");
        }
    }

    #[test]
    fn test_drain_with_nothing_pending() {
        let store = Arc::new(RecordingStore::default());
        let (_handle, mut worker) = SweepWorker::new(store.clone());

        assert_eq!(worker.drain(), None);
        assert!(store.sweeps.lock().is_empty());
    }

    #[test]
    fn test_drain_coalesces_to_largest_age() {
        let store = Arc::new(RecordingStore::default());
        let (handle, mut worker) = SweepWorker::new(store.clone());

        handle.request(2_000);
        handle.request(20_000);
        handle.request(10_000);

        assert_eq!(worker.drain(), Some(20_000));
        assert_eq!(*store.sweeps.lock(), vec![20_000]);
    }

    #[test]
    fn test_full_queue_drops_requests() {
        let store = Arc::new(RecordingStore::default());
        let (handle, mut worker) = SweepWorker::new(store.clone());

        for _ in 0..(SWEEP_QUEUE_CAPACITY * 2) {
            handle.request(1_000);
        }

        assert_eq!(worker.drain(), Some(1_000));
        assert_eq!(store.sweeps.lock().len(), 1);
    }

    #[test]
    fn test_full_queue_keeps_largest_queued_age() {
        let store = Arc::new(RecordingStore::default());
        let (handle, mut worker) = SweepWorker::new(store.clone());

        for _ in 0..SWEEP_QUEUE_CAPACITY {
            handle.request(10_000);
        }
        // Dropped: the queue is full
        handle.request(1_000);

        assert_eq!(worker.drain(), Some(10_000));
        assert_eq!(*store.sweeps.lock(), vec![10_000]);
    }

    #[test]
    fn test_disconnected_handle_drops_requests() {
        let handle = SweepHandle::disconnected();
        handle.request(1_000);
    }

    #[test]
    fn test_panicking_sweep_is_contained() {
        let (handle, mut worker) = SweepWorker::new(Arc::new(PanickingStore));

        handle.request(1_000);
        assert_eq!(worker.drain(), Some(1_000));

        handle.request(2_000);
        assert_eq!(worker.drain(), Some(2_000));
    }

    #[test]
    fn test_drain_removes_expired_records() {
        let clock = ManualClock::new(0);
        let store = Arc::new(InMemoryCounterStore::with_clock(Arc::new(clock.clone())));
        let (handle, mut worker) = SweepWorker::new(store.clone());

        store.increment_and_get(CounterKey::new("10.0.0.1", "/api", 0));
        clock.set(3_000);

        handle.request(2_000);
        worker.drain();

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_sweep_is_contained_in_worker() {
        let (handle, worker) = SweepWorker::new(Arc::new(PanickingStore));
        let task = worker.spawn();

        handle.request(1_000);
        handle.request(2_000);
        drop(handle);

        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_removes_expired_records() {
        let clock = ManualClock::new(0);
        let store = Arc::new(InMemoryCounterStore::with_clock(Arc::new(clock.clone())));
        for i in 0..1_000 {
            store.increment_and_get(CounterKey::new(&format!("10.0.{}.{}", i / 256, i % 256), "/api", 0));
        }
        clock.set(10_000);

        let (handle, worker) = SweepWorker::new(store.clone());
        let task = worker.spawn();
        handle.request(5_000);
        drop(handle);
        task.await.unwrap();

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_when_handles_dropped() {
        let store = Arc::new(RecordingStore::default());
        let (handle, worker) = SweepWorker::new(store.clone());
        let task = worker.spawn();

        handle.request(4_000);
        drop(handle);
        task.await.unwrap();

        assert_eq!(*store.sweeps.lock(), vec![4_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep_runs_without_requests() {
        let store = Arc::new(RecordingStore::default());
        let (handle, worker) = SweepWorker::new(store.clone());
        let task = worker.spawn_with_interval(Duration::from_secs(60), 120_000);

        tokio::time::sleep(Duration::from_secs(150)).await;
        drop(handle);
        task.await.unwrap();

        let sweeps = store.sweeps.lock();
        assert!(sweeps.len() >= 2);
        assert!(sweeps.iter().all(|&age| age == 120_000));
    }
}
