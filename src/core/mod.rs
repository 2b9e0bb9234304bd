pub mod failover;
pub mod work_queue;

pub use failover::{FailoverStrategy, FailoverStrategyFactory, FailoverStrategyKind};
pub use work_queue::{WorkQueueExecutor, WorkQueueExecutorManager};
