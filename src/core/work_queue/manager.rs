//! Registry of live work queue executors.
//!
//! Executors are created lazily from the work queue definitions held by a
//! [`WorkQueueEntityManager`] and kept in step with later edits. All registry
//! mutations (create, replace, resize, remove) run under one manager-wide
//! lock; the lock is never held while tasks execute, so it only delays
//! submissions that race a reconfiguration.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use scc::HashMap;

use super::{
    entity::{WorkQueue, WorkQueueId},
    executor::{DEFAULT_KEEP_ALIVE, WorkQueueExecutor},
};
use crate::{ports::WorkQueueEntityManager, tracing_setup::work_queue_span};

/// Owns one bounded executor per work queue definition.
pub struct WorkQueueExecutorManager {
    entity_manager: Arc<dyn WorkQueueEntityManager>,
    executors: HashMap<WorkQueueId, WorkQueueExecutor>,
    admin_lock: Mutex<()>,
    keep_alive: Duration,
}

impl WorkQueueExecutorManager {
    pub fn new(entity_manager: Arc<dyn WorkQueueEntityManager>) -> Self {
        Self::with_keep_alive(entity_manager, DEFAULT_KEEP_ALIVE)
    }

    /// Create a manager whose executors reclaim threads idle for `keep_alive`.
    pub fn with_keep_alive(
        entity_manager: Arc<dyn WorkQueueEntityManager>,
        keep_alive: Duration,
    ) -> Self {
        Self {
            entity_manager,
            executors: HashMap::new(),
            admin_lock: Mutex::new(()),
            keep_alive,
        }
    }

    fn cached(&self, id: WorkQueueId) -> Option<WorkQueueExecutor> {
        self.executors.read_sync(&id, |_, executor| executor.clone())
    }

    /// Executor for the work queue `id`, creating it on first use.
    ///
    /// Returns `None` (after logging) when the definition cannot be found or
    /// the lookup fails.
    pub fn get_work_queue_executor(&self, id: WorkQueueId) -> Option<WorkQueueExecutor> {
        if let Some(executor) = self.cached(id) {
            return Some(executor);
        }

        let _guard = self.admin_lock.lock();
        // Another caller may have created it while we waited for the lock.
        if let Some(executor) = self.cached(id) {
            return Some(executor);
        }

        match self.entity_manager.find_by_primary_key(id) {
            Ok(Some(work_queue)) => Some(self.create_locked(&work_queue)),
            Ok(None) => {
                tracing::warn!(work_queue.id = %id, "Work queue not found; no executor created");
                None
            }
            Err(e) => {
                tracing::warn!(
                    work_queue.id = %id,
                    "Unable to look up work queue: {}",
                    e
                );
                None
            }
        }
    }

    /// Executor for the work queue with the given unique name.
    pub fn get_work_queue_executor_by_name(&self, name: &str) -> Option<WorkQueueExecutor> {
        match self.entity_manager.find_by_unique_name(name) {
            Ok(Some(work_queue)) => self.get_work_queue_executor(work_queue.id),
            Ok(None) => {
                tracing::warn!(work_queue.name = name, "Work queue not found");
                None
            }
            Err(e) => {
                tracing::warn!(work_queue.name = name, "Unable to look up work queue: {}", e);
                None
            }
        }
    }

    fn create_locked(&self, work_queue: &WorkQueue) -> WorkQueueExecutor {
        let _span = work_queue_span(work_queue.id.0, &work_queue.name).entered();
        let executor = WorkQueueExecutor::for_work_queue(work_queue, self.keep_alive);
        let _ = self.executors.remove_sync(&work_queue.id);
        let _ = self.executors.insert_sync(work_queue.id, executor.clone());

        tracing::info!(
            core_pool_size = executor.core_pool_size(),
            maximum_pool_size = executor.maximum_pool_size(),
            queue_capacity = executor.queue_capacity(),
            reject_policy = %work_queue.reject_policy,
            "Created work queue executor"
        );
        executor
    }

    /// Shut down and forget the executor for `id`. Tasks already queued still
    /// run. No-op when no executor exists.
    pub fn remove_work_queue_executor(&self, id: WorkQueueId) {
        let _guard = self.admin_lock.lock();
        if let Some((_, executor)) = self.executors.remove_sync(&id) {
            let _span = work_queue_span(id.0, executor.name()).entered();
            executor.shutdown();
            tracing::info!("Removed work queue executor");
        }
    }

    /// Shut down and forget the executor for a deleted work queue.
    pub fn remove_work_queue_executor_for(&self, work_queue: &WorkQueue) {
        self.remove_work_queue_executor(work_queue.id);
    }

    /// Apply an edited definition to the live executor.
    ///
    /// A different queue size replaces the executor outright, since queue
    /// capacity is fixed at creation; tasks already in the old queue drain
    /// under the old pool. Any other change is applied in place. Nothing
    /// happens until the executor has been created.
    pub fn update_work_queue_executor(&self, new: &WorkQueue, old: &WorkQueue) {
        let _guard = self.admin_lock.lock();
        let _span = work_queue_span(new.id.0, &new.name).entered();
        let Some(existing) = self.cached(new.id) else {
            tracing::debug!("Work queue updated before first use; executor will be created lazily");
            return;
        };

        let capacity = (new.max_queue_size as usize).max(1);
        if new.max_queue_size != old.max_queue_size || existing.queue_capacity() != capacity {
            existing.shutdown();
            let _ = self.executors.remove_sync(&new.id);
            tracing::info!(
                old_queue_size = old.max_queue_size,
                new_queue_size = new.max_queue_size,
                "Queue size changed; replacing work queue executor"
            );
            self.create_locked(new);
            return;
        }

        existing.set_maximum_pool_size(new.thread_pool_max as usize);
        existing.set_core_pool_size(new.core_pool_size());
        if new.reject_policy != existing.reject_policy() {
            existing.set_reject_policy(new.reject_policy);
        }

        tracing::info!(
            core_pool_size = existing.core_pool_size(),
            maximum_pool_size = existing.maximum_pool_size(),
            reject_policy = %new.reject_policy,
            "Updated work queue executor"
        );
    }

    /// Number of live executors.
    pub fn executor_count(&self) -> usize {
        self.executors.len()
    }

    /// Shut every executor down and wait up to `timeout` for their threads to
    /// finish. Returns `false` if some executor was still running at the
    /// deadline.
    pub fn shutdown_all(&self, timeout: Duration) -> bool {
        let executors = {
            let _guard = self.admin_lock.lock();
            let mut drained = Vec::with_capacity(self.executors.len());
            self.executors.retain_sync(|_, executor| {
                drained.push(executor.clone());
                false
            });
            drained
        };

        for executor in &executors {
            executor.shutdown();
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut all_terminated = true;
        for executor in &executors {
            let remaining = deadline.map_or(Duration::MAX, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
            if !executor.await_termination(remaining) {
                tracing::warn!(
                    work_queue.name = executor.name(),
                    pending = executor.queued_tasks(),
                    "Work queue executor did not terminate in time"
                );
                all_terminated = false;
            }
        }
        all_terminated
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap as StdHashMap,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        thread,
    };

    use tracing_subscriber::{
        Registry,
        layer::{Context, Layer, SubscriberExt},
        registry::LookupSpan,
    };

    use super::*;
    use crate::{core::work_queue::RejectPolicy, ports::FindError};

    #[derive(Default)]
    struct FakeStore {
        queues: Mutex<StdHashMap<WorkQueueId, WorkQueue>>,
        lookups: AtomicUsize,
        broken: AtomicBool,
    }

    impl FakeStore {
        fn put(&self, work_queue: WorkQueue) {
            self.queues.lock().insert(work_queue.id, work_queue);
        }
    }

    impl WorkQueueEntityManager for FakeStore {
        fn find_by_primary_key(&self, id: WorkQueueId) -> Result<Option<WorkQueue>, FindError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                return Err(FindError::Unavailable("database down".to_string()));
            }
            Ok(self.queues.lock().get(&id).cloned())
        }

        fn find_by_unique_name(&self, name: &str) -> Result<Option<WorkQueue>, FindError> {
            Ok(self
                .queues
                .lock()
                .values()
                .find(|q| q.name == name)
                .cloned())
        }
    }

    fn queue(id: u64, max: u32, size: u32) -> WorkQueue {
        WorkQueue::new(id, format!("q{id}"), max, size, RejectPolicy::FailImmediately)
    }

    fn manager_with(store: Arc<FakeStore>) -> WorkQueueExecutorManager {
        WorkQueueExecutorManager::with_keep_alive(store, Duration::from_secs(1))
    }

    /// Records `(message, enclosing span)` for every event.
    #[derive(Clone, Default)]
    struct EventSpans(Arc<Mutex<Vec<(String, Option<&'static str>)>>>);

    struct Message(String);

    impl tracing::field::Visit for Message {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<R> Layer<R> for EventSpans
    where
        R: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, R>) {
            let mut message = Message(String::new());
            event.record(&mut message);
            let span = ctx.event_span(event).map(|span| span.name());
            self.0.lock().push((message.0, span));
        }
    }

    #[test]
    fn test_executor_changes_are_logged_in_work_queue_span() {
        let events = EventSpans::default();
        let subscriber = Registry::default().with(events.clone());
        let store = Arc::new(FakeStore::default());
        let old = queue(4, 4, 10);
        store.put(old.clone());
        let manager = manager_with(store.clone());

        tracing::subscriber::with_default(subscriber, || {
            manager.get_work_queue_executor(old.id).unwrap();
            let resized = WorkQueue {
                thread_pool_max: 8,
                ..old.clone()
            };
            manager.update_work_queue_executor(&resized, &old);
            manager.remove_work_queue_executor(old.id);
        });

        let events = events.0.lock();
        for message in [
            "Created work queue executor",
            "Updated work queue executor",
            "Removed work queue executor",
        ] {
            let (_, span) = events
                .iter()
                .find(|(logged, _)| logged == message)
                .unwrap_or_else(|| panic!("missing event {message:?}"));
            assert_eq!(*span, Some("work_queue"), "{message}");
        }
    }

    #[test]
    fn test_lazy_creation_is_cached() {
        let store = Arc::new(FakeStore::default());
        store.put(queue(1, 20, 10));
        let manager = manager_with(store.clone());

        let first = manager.get_work_queue_executor(WorkQueueId(1)).unwrap();
        let second = manager.get_work_queue_executor(WorkQueueId(1)).unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(first.maximum_pool_size(), 20);
        assert_eq!(first.core_pool_size(), 15);
        assert_eq!(first.queue_capacity(), 10);
    }

    #[test]
    fn test_missing_or_failed_lookup_returns_none() {
        let store = Arc::new(FakeStore::default());
        let manager = manager_with(store.clone());
        assert!(manager.get_work_queue_executor(WorkQueueId(9)).is_none());

        store.put(queue(9, 2, 2));
        store.broken.store(true, Ordering::SeqCst);
        assert!(manager.get_work_queue_executor(WorkQueueId(9)).is_none());
        assert_eq!(manager.executor_count(), 0);
    }

    #[test]
    fn test_concurrent_first_access_creates_one_executor() {
        let store = Arc::new(FakeStore::default());
        store.put(queue(3, 4, 4));
        let manager = Arc::new(manager_with(store.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                thread::spawn(move || manager.get_work_queue_executor(WorkQueueId(3)).unwrap())
            })
            .collect();
        let executors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(executors.iter().all(|e| e.ptr_eq(&executors[0])));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_queue_size_change_replaces_executor() {
        let store = Arc::new(FakeStore::default());
        let old = queue(1, 4, 10);
        store.put(old.clone());
        let manager = manager_with(store.clone());
        let before = manager.get_work_queue_executor(old.id).unwrap();

        let new = WorkQueue {
            max_queue_size: 20,
            ..old.clone()
        };
        store.put(new.clone());
        manager.update_work_queue_executor(&new, &old);

        let after = manager.get_work_queue_executor(old.id).unwrap();
        assert!(!before.ptr_eq(&after));
        assert!(before.is_shutdown());
        assert_eq!(after.queue_capacity(), 20);
    }

    #[test]
    fn test_pool_size_change_updates_in_place() {
        let store = Arc::new(FakeStore::default());
        let old = queue(1, 4, 10);
        store.put(old.clone());
        let manager = manager_with(store.clone());
        let before = manager.get_work_queue_executor(old.id).unwrap();

        let new = WorkQueue {
            thread_pool_max: 40,
            reject_policy: RejectPolicy::CallerBlocks,
            ..old.clone()
        };
        manager.update_work_queue_executor(&new, &old);

        let after = manager.get_work_queue_executor(old.id).unwrap();
        assert!(before.ptr_eq(&after));
        assert_eq!(after.maximum_pool_size(), 40);
        assert_eq!(after.core_pool_size(), 30);
        assert_eq!(after.reject_policy(), RejectPolicy::CallerBlocks);
    }

    #[test]
    fn test_update_before_first_use_is_noop() {
        let store = Arc::new(FakeStore::default());
        let manager = manager_with(store.clone());
        let old = queue(5, 1, 1);
        manager.update_work_queue_executor(&queue(5, 2, 2), &old);
        assert_eq!(manager.executor_count(), 0);
    }

    #[test]
    fn test_remove_forces_fresh_lookup() {
        let store = Arc::new(FakeStore::default());
        store.put(queue(1, 2, 2));
        let manager = manager_with(store.clone());

        let before = manager.get_work_queue_executor(WorkQueueId(1)).unwrap();
        manager.remove_work_queue_executor(WorkQueueId(1));
        assert!(before.is_shutdown());
        assert_eq!(manager.executor_count(), 0);

        let after = manager.get_work_queue_executor(WorkQueueId(1)).unwrap();
        assert!(!before.ptr_eq(&after));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);

        // Removing something absent is harmless.
        manager.remove_work_queue_executor(WorkQueueId(42));
    }

    #[test]
    fn test_lookup_by_name() {
        let store = Arc::new(FakeStore::default());
        store.put(queue(7, 2, 2));
        let manager = manager_with(store);

        let by_name = manager.get_work_queue_executor_by_name("q7").unwrap();
        let by_id = manager.get_work_queue_executor(WorkQueueId(7)).unwrap();
        assert!(by_name.ptr_eq(&by_id));
        assert!(manager.get_work_queue_executor_by_name("missing").is_none());
    }

    #[test]
    fn test_shutdown_all() {
        let store = Arc::new(FakeStore::default());
        store.put(queue(1, 2, 2));
        store.put(queue(2, 2, 2));
        let manager = manager_with(store);

        let a = manager.get_work_queue_executor(WorkQueueId(1)).unwrap();
        let b = manager.get_work_queue_executor(WorkQueueId(2)).unwrap();
        a.execute(|| thread::sleep(Duration::from_millis(20))).unwrap();
        b.execute(|| {}).unwrap();

        assert!(manager.shutdown_all(Duration::from_secs(5)));
        assert_eq!(manager.executor_count(), 0);
        assert!(a.is_terminated());
        assert!(b.is_terminated());
    }

    #[test]
    fn test_shutdown_all_with_unbounded_timeout() {
        let store = Arc::new(FakeStore::default());
        store.put(queue(1, 2, 2));
        let manager = manager_with(store);

        let executor = manager.get_work_queue_executor(WorkQueueId(1)).unwrap();
        executor
            .execute(|| thread::sleep(Duration::from_millis(20)))
            .unwrap();

        assert!(manager.shutdown_all(Duration::MAX));
        assert!(executor.is_terminated());
    }
}
