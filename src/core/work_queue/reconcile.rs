use std::{collections::BTreeMap, sync::Arc};

use super::{
    entity::{WorkQueue, WorkQueueId},
    manager::WorkQueueExecutorManager,
};

/// Difference between two generations of work queue definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkQueueChanges {
    pub created: Vec<WorkQueue>,
    /// `(new, old)` pairs for definitions whose properties changed
    pub updated: Vec<(WorkQueue, WorkQueue)>,
    pub deleted: Vec<WorkQueue>,
}

impl WorkQueueChanges {
    /// Compare two definition sets keyed by id.
    pub fn between(
        old: &BTreeMap<WorkQueueId, WorkQueue>,
        new: &BTreeMap<WorkQueueId, WorkQueue>,
    ) -> Self {
        let mut changes = Self::default();

        for (id, work_queue) in new {
            match old.get(id) {
                None => changes.created.push(work_queue.clone()),
                Some(previous) if previous != work_queue => changes
                    .updated
                    .push((work_queue.clone(), previous.clone())),
                Some(_) => {}
            }
        }

        changes.deleted = old
            .iter()
            .filter(|(id, _)| !new.contains_key(id))
            .map(|(_, work_queue)| work_queue.clone())
            .collect();

        changes
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Applies definition changes to the live executors.
pub struct WorkQueueReconciler {
    manager: Arc<WorkQueueExecutorManager>,
}

impl WorkQueueReconciler {
    pub fn new(manager: Arc<WorkQueueExecutorManager>) -> Self {
        Self { manager }
    }

    /// New queues stay lazy; edits and deletions reach the executors now.
    pub fn apply(&self, changes: &WorkQueueChanges) {
        if changes.is_empty() {
            tracing::debug!("No work queue changes to apply");
            return;
        }

        tracing::info!(
            created = changes.created.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            "Applying work queue changes"
        );

        for (new, old) in &changes.updated {
            self.manager.update_work_queue_executor(new, old);
        }
        for deleted in &changes.deleted {
            self.manager.remove_work_queue_executor_for(deleted);
        }
    }
}
