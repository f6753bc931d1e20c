//! Hand-off to the task scheduler
//!
//! The scheduler itself lives outside this crate. It owns retries, timeouts
//! and state transitions once a task is accepted.

use thiserror::Error;
use tracing::{debug, warn};

use crate::task::{Task, TaskId};

/// Scheduler rejection reasons
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Task {0} conflicts with a running task")]
    Conflict(TaskId),

    #[error("Task {task_id} rejected: {reason}")]
    Rejected { task_id: TaskId, reason: String },
}

/// Accepts built tasks for execution
pub trait TaskScheduler: Send + Sync {
    fn add(&self, task: Task) -> std::result::Result<(), SchedulerError>;
}

/// Submit tasks in order and return how many were accepted
///
/// A rejection is logged and does not stop the remaining tasks.
pub fn submit_tasks<S: TaskScheduler + ?Sized>(scheduler: &S, tasks: Vec<Task>) -> usize {
    let mut accepted = 0;
    for task in tasks {
        let task_id = task.id();
        let collection = task.collection_id();
        match scheduler.add(task) {
            Ok(()) => {
                debug!(task_id, collection, "Task submitted");
                accepted += 1;
            }
            Err(e) => {
                warn!(task_id, collection, error = %e, "Failed to submit task");
            }
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Action, ActionType, Source, TaskHeader};
    use parking_lot::Mutex;
    use querycoord_meta::Replica;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Accepts everything except one channel
    struct RecordingScheduler {
        reject_shard: &'static str,
        accepted: Mutex<Vec<TaskId>>,
    }

    impl TaskScheduler for RecordingScheduler {
        fn add(&self, task: Task) -> std::result::Result<(), SchedulerError> {
            if task.shard() == self.reject_shard {
                return Err(SchedulerError::Conflict(task.id()));
            }
            self.accepted.lock().push(task.id());
            Ok(())
        }
    }

    fn make_task(id: TaskId, channel: &str) -> Task {
        let header = TaskHeader {
            id,
            source: Source::Balancer,
            timeout: Duration::from_secs(5),
            collection_id: 100,
        };
        let replica = Replica::new(1, 100, vec![]);
        let actions = vec![Action::channel(1, ActionType::Grow, channel)];
        Task::new_channel_task(&CancellationToken::new(), header, &replica, actions).unwrap()
    }

    #[test]
    fn test_submit_continues_after_rejection() {
        let scheduler = RecordingScheduler {
            reject_shard: "b",
            accepted: Mutex::new(Vec::new()),
        };

        let accepted = submit_tasks(
            &scheduler,
            vec![make_task(1, "a"), make_task(2, "b"), make_task(3, "c")],
        );

        assert_eq!(accepted, 2);
        assert_eq!(*scheduler.accepted.lock(), vec![1, 3]);
    }
}
