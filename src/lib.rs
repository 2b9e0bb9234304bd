//! Ward - failover server selection and managed work queues.
//!
//! Ward bundles two independent building blocks used by request-processing
//! services:
//!
//! * **Failover strategies** pick one server out of a fixed pool and adapt to
//!   reported successes and failures (sticky, round robin, random and ordered
//!   sticky with periodic probing of preferred servers).
//! * **Work queue executors** are named, bounded thread pools created lazily
//!   from administrator-defined work queue definitions and kept in step with
//!   later edits to those definitions.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use ward::{
//!     FailoverStrategyFactory, InMemoryWorkQueueStore, RejectPolicy, WorkQueue,
//!     WorkQueueExecutorManager, WorkQueueId, make_synchronized,
//! };
//!
//! # fn main() -> eyre::Result<()> {
//! let strategy = make_synchronized(FailoverStrategyFactory::create_failover_strategy(
//!     "ordered",
//!     vec!["10.0.0.1:8443".to_string(), "10.0.0.2:8443".to_string()],
//! )?);
//! let server = strategy.select_service();
//! strategy.report_success(&server)?;
//!
//! let store = Arc::new(InMemoryWorkQueueStore::new([WorkQueue::new(
//!     1,
//!     "audit",
//!     8,
//!     100,
//!     RejectPolicy::FailImmediately,
//! )]));
//! let manager = WorkQueueExecutorManager::new(store);
//! if let Some(executor) = manager.get_work_queue_executor(WorkQueueId(1)) {
//!     executor.execute(|| println!("audited"))?;
//! }
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Business logic lives in `core`. The lookup of work queue definitions and
//! the configuration source are **ports** (traits) with **adapters** for an
//! in-memory store and a watched configuration file.
//!
//! # Concurrency
//! Strategies are plain state machines taking `&mut self`; wrap them with
//! [`make_synchronized`] to share them. Executors run tasks on OS threads. The
//! executor registry uses `scc::HashMap` so cache hits never contend with
//! reconfiguration.
//!
//! # Error Handling
//! Library modules return their own `thiserror` types. The binary and the
//! configuration loader use `eyre::Result` with `WrapErr` context.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{FileConfigProvider, InMemoryWorkQueueStore},
    core::{
        failover::{
            FailoverError, FailoverStrategy, FailoverStrategyFactory, FailoverStrategyKind,
            SynchronizedFailoverStrategy, make_synchronized,
        },
        work_queue::{
            ExecutorError, RejectPolicy, WorkQueue, WorkQueueExecutor, WorkQueueExecutorManager,
            WorkQueueId, WorkQueueReconciler,
        },
    },
    ports::WorkQueueEntityManager,
    utils::GracefulShutdown,
};
