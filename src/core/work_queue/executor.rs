//! Bounded OS-thread pool backing a single work queue.
//!
//! Submission follows the classic core/max pool rules: a new thread is started
//! while fewer than `core_pool_size` threads are alive, otherwise the task is
//! queued, and only when the queue is full does the pool grow towards
//! `maximum_pool_size`. A saturated pool applies its [`RejectPolicy`].
//!
//! Idle threads, core threads included, exit after `keep_alive`.
use std::{
    collections::VecDeque,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

use super::entity::{RejectPolicy, WorkQueue};

/// Idle time after which a worker thread exits.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors surfaced to a task submitter
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The pool and its queue are saturated, or a blocked submission was cut
    /// short by shutdown
    #[error("Work queue '{queue}' rejected the task (queue capacity {capacity})")]
    Rejected { queue: String, capacity: usize },

    /// The pool no longer accepts tasks
    #[error("Work queue '{queue}' has been shut down")]
    Shutdown { queue: String },

    /// The operating system refused to start a worker thread
    #[error("Failed to start a worker thread for work queue '{queue}'")]
    Spawn {
        queue: String,
        #[source]
        source: std::io::Error,
    },
}

struct PoolState {
    queue: VecDeque<Task>,
    core_pool_size: usize,
    maximum_pool_size: usize,
    reject_policy: RejectPolicy,
    workers: usize,
    active: usize,
    completed: u64,
    shutdown: bool,
    next_thread_id: u64,
}

struct Shared {
    name: String,
    capacity: usize,
    keep_alive: Duration,
    state: Mutex<PoolState>,
    task_ready: Condvar,
    space_ready: Condvar,
    terminated: Condvar,
    #[cfg(test)]
    refuse_spawns: std::sync::atomic::AtomicBool,
}

/// Cloneable handle to a bounded pool. Clones refer to the same pool.
#[derive(Clone)]
pub struct WorkQueueExecutor {
    shared: Arc<Shared>,
}

impl WorkQueueExecutor {
    /// Create a pool. Sizes are clamped so that `1 <= core <= max` and the
    /// queue holds at least one task. No thread is started until the first
    /// submission.
    pub fn new(
        name: impl Into<String>,
        core_pool_size: usize,
        maximum_pool_size: usize,
        queue_capacity: usize,
        reject_policy: RejectPolicy,
        keep_alive: Duration,
    ) -> Self {
        let maximum_pool_size = maximum_pool_size.max(1);
        let core_pool_size = core_pool_size.clamp(1, maximum_pool_size);
        let capacity = queue_capacity.max(1);

        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                capacity,
                keep_alive,
                state: Mutex::new(PoolState {
                    queue: VecDeque::with_capacity(capacity.min(1024)),
                    core_pool_size,
                    maximum_pool_size,
                    reject_policy,
                    workers: 0,
                    active: 0,
                    completed: 0,
                    shutdown: false,
                    next_thread_id: 0,
                }),
                task_ready: Condvar::new(),
                space_ready: Condvar::new(),
                terminated: Condvar::new(),
                #[cfg(test)]
                refuse_spawns: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Create a pool sized from a work queue definition.
    pub fn for_work_queue(work_queue: &WorkQueue, keep_alive: Duration) -> Self {
        Self::new(
            work_queue.name.clone(),
            work_queue.core_pool_size(),
            work_queue.thread_pool_max as usize,
            work_queue.max_queue_size as usize,
            work_queue.reject_policy,
            keep_alive,
        )
    }

    /// Submit a task.
    ///
    /// Under [`RejectPolicy::CallerBlocks`] this blocks the calling thread
    /// until the queue has room.
    pub fn execute<F>(&self, task: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let task: Task = Box::new(task);
        let mut state = self.shared.state.lock();

        loop {
            if state.shutdown {
                return Err(ExecutorError::Shutdown {
                    queue: self.shared.name.clone(),
                });
            }

            if state.workers < state.core_pool_size {
                return self.spawn_worker(&mut state, Some(task));
            }

            if state.queue.len() < self.shared.capacity {
                state.queue.push_back(task);
                if state.workers == 0 {
                    if let Err(e) = self.spawn_worker(&mut state, None) {
                        // Nothing will run it; the caller sees the error instead.
                        state.queue.pop_back();
                        return Err(e);
                    }
                    return Ok(());
                }
                self.shared.task_ready.notify_one();
                return Ok(());
            }

            if state.workers < state.maximum_pool_size {
                return self.spawn_worker(&mut state, Some(task));
            }

            match state.reject_policy {
                RejectPolicy::FailImmediately => return Err(self.rejected()),
                RejectPolicy::CallerBlocks => {
                    self.shared.space_ready.wait(&mut state);
                    if state.shutdown {
                        return Err(self.rejected());
                    }
                }
            }
        }
    }

    fn rejected(&self) -> ExecutorError {
        ExecutorError::Rejected {
            queue: self.shared.name.clone(),
            capacity: self.shared.capacity,
        }
    }

    fn spawn_worker(
        &self,
        state: &mut MutexGuard<'_, PoolState>,
        first_task: Option<Task>,
    ) -> Result<(), ExecutorError> {
        state.next_thread_id += 1;
        let thread_name = format!("workqueue-{}-{}", self.shared.name, state.next_thread_id);
        let has_first = first_task.is_some();

        match self.start_thread(thread_name, first_task) {
            Ok(()) => {
                state.workers += 1;
                if has_first {
                    state.active += 1;
                }
                Ok(())
            }
            Err(source) => {
                tracing::error!(
                    queue = %self.shared.name,
                    "Failed to start work queue thread: {}",
                    source
                );
                Err(ExecutorError::Spawn {
                    queue: self.shared.name.clone(),
                    source,
                })
            }
        }
    }

    fn start_thread(&self, name: String, first_task: Option<Task>) -> std::io::Result<()> {
        #[cfg(test)]
        if self
            .shared
            .refuse_spawns
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(std::io::Error::other("thread creation refused"));
        }

        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(name)
            .spawn(move || shared.run_worker(first_task))
            .map(|_| ())
    }

    /// Change the number of threads kept for normal load. Clamped to
    /// `1..=maximum_pool_size`.
    pub fn set_core_pool_size(&self, core_pool_size: usize) {
        let mut state = self.shared.state.lock();
        state.core_pool_size = core_pool_size.clamp(1, state.maximum_pool_size);

        // Put new core threads to work on anything already queued.
        while state.workers < state.core_pool_size && state.workers < state.queue.len() {
            if self.spawn_worker(&mut state, None).is_err() {
                break;
            }
        }
    }

    /// Change the upper bound on threads. Lowers the core size if needed;
    /// surplus threads exit once they finish their current task.
    pub fn set_maximum_pool_size(&self, maximum_pool_size: usize) {
        let mut state = self.shared.state.lock();
        state.maximum_pool_size = maximum_pool_size.max(1);
        if state.core_pool_size > state.maximum_pool_size {
            state.core_pool_size = state.maximum_pool_size;
        }
        if state.workers > state.maximum_pool_size {
            self.shared.task_ready.notify_all();
        }
    }

    /// Install a new policy for saturated submissions.
    pub fn set_reject_policy(&self, reject_policy: RejectPolicy) {
        let mut state = self.shared.state.lock();
        state.reject_policy = reject_policy;
        // Submitters blocked under the old policy re-evaluate.
        self.shared.space_ready.notify_all();
    }

    /// Stop accepting tasks. Queued and running tasks still complete.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        self.shared.task_ready.notify_all();
        self.shared.space_ready.notify_all();
        if state.workers == 0 {
            state.queue.clear();
            self.shared.terminated.notify_all();
        }
        tracing::debug!(
            queue = %self.shared.name,
            pending = state.queue.len(),
            "Work queue executor shutting down"
        );
    }

    /// Wait until every worker has exited after [`shutdown`](Self::shutdown).
    /// Returns `false` on timeout. A timeout too large to express as a
    /// deadline waits without one.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        while !(state.shutdown && state.workers == 0) {
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .terminated
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        return state.shutdown && state.workers == 0;
                    }
                }
                None => self.shared.terminated.wait(&mut state),
            }
        }
        true
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn core_pool_size(&self) -> usize {
        self.shared.state.lock().core_pool_size
    }

    pub fn maximum_pool_size(&self) -> usize {
        self.shared.state.lock().maximum_pool_size
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Tasks waiting for a thread.
    pub fn queued_tasks(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Live worker threads.
    pub fn pool_size(&self) -> usize {
        self.shared.state.lock().workers
    }

    /// Threads currently running a task.
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active
    }

    pub fn completed_task_count(&self) -> u64 {
        self.shared.state.lock().completed
    }

    pub fn reject_policy(&self) -> RejectPolicy {
        self.shared.state.lock().reject_policy
    }

    pub fn keep_alive(&self) -> Duration {
        self.shared.keep_alive
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    pub fn is_terminated(&self) -> bool {
        let state = self.shared.state.lock();
        state.shutdown && state.workers == 0
    }

    /// Whether both handles refer to the same pool.
    pub fn ptr_eq(&self, other: &WorkQueueExecutor) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for WorkQueueExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("WorkQueueExecutor")
            .field("name", &self.shared.name)
            .field("core_pool_size", &state.core_pool_size)
            .field("maximum_pool_size", &state.maximum_pool_size)
            .field("queue_capacity", &self.shared.capacity)
            .field("queued", &state.queue.len())
            .field("workers", &state.workers)
            .field("reject_policy", &state.reject_policy)
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

impl Shared {
    fn run_worker(&self, first_task: Option<Task>) {
        let mut next = match first_task {
            Some(task) => Some(task),
            None => {
                let mut state = self.state.lock();
                self.take_task(&mut state)
            }
        };

        while let Some(task) = next {
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::error!(queue = %self.name, "Work queue task panicked");
            }

            next = self.next_task();
        }
    }

    /// Record the finished task and block for the next one. `None` means the
    /// calling worker must exit.
    fn next_task(&self) -> Option<Task> {
        let mut state = self.state.lock();
        state.active -= 1;
        state.completed += 1;
        self.take_task(&mut state)
    }

    fn take_task(&self, state: &mut MutexGuard<'_, PoolState>) -> Option<Task> {
        loop {
            if state.workers > state.maximum_pool_size {
                self.retire(state);
                return None;
            }

            if let Some(task) = state.queue.pop_front() {
                state.active += 1;
                self.space_ready.notify_one();
                return Some(task);
            }

            if state.shutdown {
                self.retire(state);
                return None;
            }

            let timed_out = self
                .task_ready
                .wait_for(state, self.keep_alive)
                .timed_out();
            if timed_out && state.queue.is_empty() && !state.shutdown {
                self.retire(state);
                return None;
            }
        }
    }

    fn retire(&self, state: &mut MutexGuard<'_, PoolState>) {
        state.workers -= 1;
        if state.shutdown && state.workers == 0 {
            self.terminated.notify_all();
        }
    }
}
