//! Named, administratively configured bounded thread pools.
pub mod entity;
pub mod executor;
pub mod manager;
pub mod reconcile;

pub use entity::{RejectPolicy, WorkQueue, WorkQueueId, core_pool_size_for};
pub use executor::{DEFAULT_KEEP_ALIVE, ExecutorError, WorkQueueExecutor};
pub use manager::WorkQueueExecutorManager;
pub use reconcile::{WorkQueueChanges, WorkQueueReconciler};
