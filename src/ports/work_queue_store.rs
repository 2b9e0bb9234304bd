use thiserror::Error;

use crate::core::work_queue::{WorkQueue, WorkQueueId};

/// Errors raised while looking up work queue definitions
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum FindError {
    /// The backing store could not be queried
    #[error("Work queue store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to persisted work queue definitions.
///
/// Lookups are synchronous; the executor manager calls them on a cache miss
/// from whatever thread asked for the executor.
pub trait WorkQueueEntityManager: Send + Sync {
    /// Find a work queue by id. `Ok(None)` when no such queue exists.
    fn find_by_primary_key(&self, id: WorkQueueId) -> Result<Option<WorkQueue>, FindError>;

    /// Find a work queue by its unique name.
    fn find_by_unique_name(&self, name: &str) -> Result<Option<WorkQueue>, FindError>;
}
