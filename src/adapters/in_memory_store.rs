use std::{collections::BTreeMap, sync::Arc};

use arc_swap::ArcSwap;

use crate::{
    core::work_queue::{WorkQueue, WorkQueueChanges, WorkQueueId},
    ports::{FindError, WorkQueueEntityManager},
};

/// Work queue definitions held in memory, typically loaded from the
/// configuration file.
///
/// Readers see a consistent snapshot; [`replace_all`](Self::replace_all)
/// swaps in a new generation and reports what changed.
pub struct InMemoryWorkQueueStore {
    queues: ArcSwap<BTreeMap<WorkQueueId, WorkQueue>>,
}

impl InMemoryWorkQueueStore {
    pub fn new(work_queues: impl IntoIterator<Item = WorkQueue>) -> Self {
        Self {
            queues: ArcSwap::from_pointee(Self::index(work_queues)),
        }
    }

    fn index(work_queues: impl IntoIterator<Item = WorkQueue>) -> BTreeMap<WorkQueueId, WorkQueue> {
        work_queues.into_iter().map(|q| (q.id, q)).collect()
    }

    /// Replace every definition and return the difference to the previous
    /// generation.
    pub fn replace_all(&self, work_queues: impl IntoIterator<Item = WorkQueue>) -> WorkQueueChanges {
        let next = Arc::new(Self::index(work_queues));
        let previous = self.queues.swap(Arc::clone(&next));
        WorkQueueChanges::between(&previous, &next)
    }

    pub fn len(&self) -> usize {
        self.queues.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.load().is_empty()
    }
}

impl WorkQueueEntityManager for InMemoryWorkQueueStore {
    fn find_by_primary_key(&self, id: WorkQueueId) -> Result<Option<WorkQueue>, FindError> {
        Ok(self.queues.load().get(&id).cloned())
    }

    fn find_by_unique_name(&self, name: &str) -> Result<Option<WorkQueue>, FindError> {
        Ok(self
            .queues
            .load()
            .values()
            .find(|work_queue| work_queue.name == name)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::work_queue::RejectPolicy;

    #[test]
    fn test_lookups() {
        let store = InMemoryWorkQueueStore::new([
            WorkQueue::new(2, "beta", 2, 2, RejectPolicy::FailImmediately),
            WorkQueue::new(1, "alpha", 2, 2, RejectPolicy::CallerBlocks),
        ]);

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.find_by_primary_key(WorkQueueId(1)).unwrap().unwrap().name,
            "alpha"
        );
        assert_eq!(
            store.find_by_unique_name("beta").unwrap().unwrap().id,
            WorkQueueId(2)
        );
        assert!(store.find_by_primary_key(WorkQueueId(3)).unwrap().is_none());
    }

    #[test]
    fn test_replace_all_reports_changes() {
        let original = WorkQueue::new(1, "alpha", 2, 2, RejectPolicy::FailImmediately);
        let store = InMemoryWorkQueueStore::new([original.clone()]);

        let edited = WorkQueue {
            max_queue_size: 8,
            ..original.clone()
        };
        let added = WorkQueue::new(2, "beta", 1, 1, RejectPolicy::FailImmediately);
        let changes = store.replace_all([edited.clone(), added.clone()]);

        assert_eq!(changes.updated, vec![(edited, original)]);
        assert_eq!(changes.created, vec![added]);
        assert!(changes.deleted.is_empty());

        let changes = store.replace_all(Vec::new());
        assert_eq!(changes.deleted.len(), 2);
        assert!(store.is_empty());
    }
}
