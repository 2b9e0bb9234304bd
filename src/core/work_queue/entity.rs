use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a work queue definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkQueueId(pub u64);

impl fmt::Display for WorkQueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for WorkQueueId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// What happens when a task is submitted to a saturated work queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectPolicy {
    /// Reject the submission immediately
    #[default]
    #[serde(alias = "FAIL_IMMEDIATELY")]
    FailImmediately,
    /// Block the submitting thread until the queue has room
    #[serde(alias = "wait_for_room", alias = "WAIT_FOR_ROOM")]
    CallerBlocks,
}

impl fmt::Display for RejectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectPolicy::FailImmediately => f.write_str("fail_immediately"),
            RejectPolicy::CallerBlocks => f.write_str("caller_blocks"),
        }
    }
}

/// Administrative definition of a named work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkQueue {
    pub id: WorkQueueId,
    pub name: String,
    /// Upper bound on worker threads
    pub thread_pool_max: u32,
    /// Capacity of the pending task queue
    pub max_queue_size: u32,
    #[serde(default)]
    pub reject_policy: RejectPolicy,
}

impl WorkQueue {
    pub fn new(
        id: impl Into<WorkQueueId>,
        name: impl Into<String>,
        thread_pool_max: u32,
        max_queue_size: u32,
        reject_policy: RejectPolicy,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            thread_pool_max,
            max_queue_size,
            reject_policy,
        }
    }

    /// Core pool size derived from `thread_pool_max`.
    pub fn core_pool_size(&self) -> usize {
        core_pool_size_for(self.thread_pool_max)
    }
}

/// Small pools keep every thread as a core thread; larger pools keep three
/// quarters (rounded up) so the remainder only spins up under a full queue.
pub fn core_pool_size_for(thread_pool_max: u32) -> usize {
    let max = thread_pool_max as usize;
    if max <= 10 { max } else { (max * 3).div_ceil(4) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_pool_size() {
        assert_eq!(core_pool_size_for(1), 1);
        assert_eq!(core_pool_size_for(10), 10);
        assert_eq!(core_pool_size_for(11), 9);
        assert_eq!(core_pool_size_for(20), 15);
        assert_eq!(core_pool_size_for(101), 76);
    }

    #[test]
    fn test_reject_policy_spellings() {
        #[derive(Deserialize)]
        struct Holder {
            policy: RejectPolicy,
        }

        for (raw, expected) in [
            ("fail_immediately", RejectPolicy::FailImmediately),
            ("FAIL_IMMEDIATELY", RejectPolicy::FailImmediately),
            ("caller_blocks", RejectPolicy::CallerBlocks),
            ("wait_for_room", RejectPolicy::CallerBlocks),
            ("WAIT_FOR_ROOM", RejectPolicy::CallerBlocks),
        ] {
            let holder: Holder =
                config::Config::builder()
                    .set_override("policy", raw)
                    .unwrap()
                    .build()
                    .unwrap()
                    .try_deserialize()
                    .unwrap();
            assert_eq!(holder.policy, expected, "spelling {raw}");
        }
    }
}
