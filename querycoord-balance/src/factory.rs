//! Task Factory
//!
//! Turns balance plans into scheduler tasks:
//! - Grow on the destination is always ordered before Reduce on the source,
//!   so the entity stays served for the whole move
//! - A plan that fails validation is skipped and recorded, never fatal
//! - Priority is derived from the task's shape and fixed at creation
//!
//! Building is pure: the result carries one [`BuildRecord`] per plan and
//! [`BuildOutcome::emit`] writes those records to the log separately.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::plan::{node_or_sentinel, AssignPlan, ChannelAssignPlan, SegmentAssignPlan};
use crate::task::{
    Action, ActionType, DataScope, Source, Task, TaskError, TaskHeader, TaskId, TaskIdAllocator,
    TaskKind, TaskPriority, TaskType,
};

/// What happened to one input plan
#[derive(Debug, Clone)]
pub struct BuildRecord {
    pub plan: AssignPlan,
    pub result: std::result::Result<TaskId, TaskError>,
}

impl BuildRecord {
    pub fn is_skipped(&self) -> bool {
        self.result.is_err()
    }
}

/// Tasks built from a batch of plans plus one record per plan
#[derive(Debug, Default)]
pub struct BuildOutcome {
    /// Successfully built tasks, in input plan order
    pub tasks: Vec<Task>,
    pub records: Vec<BuildRecord>,
}

impl BuildOutcome {
    pub fn skipped(&self) -> usize {
        self.records.iter().filter(|r| r.is_skipped()).count()
    }

    /// Write every record to the log
    pub fn emit(&self) {
        for record in &self.records {
            emit_record(record);
        }
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}

fn emit_record(record: &BuildRecord) {
    let replica = record.plan.replica().id;
    let from = node_or_sentinel(record.plan.from());
    let to = node_or_sentinel(record.plan.to());

    match (&record.plan, &record.result) {
        (AssignPlan::Segment(p), Err(e)) => warn!(
            collection = p.segment.collection_id,
            segment_id = p.segment.id,
            replica,
            channel = %p.segment.insert_channel,
            from,
            to,
            error = %e,
            "Create segment task from plan failed"
        ),
        (AssignPlan::Segment(p), Ok(task_id)) => info!(
            task_id,
            collection = p.segment.collection_id,
            segment_id = p.segment.id,
            replica,
            channel = %p.segment.insert_channel,
            level = %p.segment.level,
            load_priority = p.load_priority.as_i32(),
            from,
            to,
            "Create segment task"
        ),
        (AssignPlan::Channel(p), Err(e)) => warn!(
            collection = p.channel.collection_id,
            replica,
            channel = %p.channel.channel_name,
            from,
            to,
            error = %e,
            "Create channel task failed"
        ),
        (AssignPlan::Channel(p), Ok(task_id)) => info!(
            task_id,
            collection = p.channel.collection_id,
            replica,
            channel = %p.channel.channel_name,
            from,
            to,
            "Create channel task"
        ),
    }
}

/// Priority for a freshly built task
///
/// Channel tasks are `High`, segment moves `Low`, any other segment task
/// `Normal`.
pub fn priority_for(task: &Task) -> TaskPriority {
    match task.kind() {
        TaskKind::Channel => TaskPriority::High,
        TaskKind::Segment if task.task_type() == TaskType::Move => TaskPriority::Low,
        TaskKind::Segment => TaskPriority::Normal,
    }
}

/// Builds scheduler tasks from balance plans
#[derive(Debug, Clone, Default)]
pub struct TaskFactory {
    ids: Arc<TaskIdAllocator>,
}

impl TaskFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an id allocator with other factories
    pub fn with_allocator(ids: Arc<TaskIdAllocator>) -> Self {
        Self { ids }
    }

    /// Build one task per valid segment plan
    #[instrument(skip(self, ctx, plans), fields(plan_count = plans.len()))]
    pub fn build_segment_tasks(
        &self,
        ctx: &CancellationToken,
        source: Source,
        timeout: Duration,
        plans: &[SegmentAssignPlan],
    ) -> BuildOutcome {
        let mut outcome = BuildOutcome {
            tasks: Vec::with_capacity(plans.len()),
            records: Vec::with_capacity(plans.len()),
        };

        for plan in plans {
            let result = self.segment_task(ctx, source, timeout, plan).map(|mut task| {
                task.set_priority(priority_for(&task));
                let id = task.id();
                outcome.tasks.push(task);
                id
            });

            outcome.records.push(BuildRecord {
                plan: AssignPlan::Segment(plan.clone()),
                result,
            });
        }

        outcome
    }

    /// Build one task per valid channel plan
    #[instrument(skip(self, ctx, plans), fields(plan_count = plans.len()))]
    pub fn build_channel_tasks(
        &self,
        ctx: &CancellationToken,
        source: Source,
        timeout: Duration,
        plans: &[ChannelAssignPlan],
    ) -> BuildOutcome {
        let mut outcome = BuildOutcome {
            tasks: Vec::with_capacity(plans.len()),
            records: Vec::with_capacity(plans.len()),
        };

        for plan in plans {
            let result = self.channel_task(ctx, source, timeout, plan).map(|mut task| {
                task.set_priority(priority_for(&task));
                let id = task.id();
                outcome.tasks.push(task);
                id
            });

            outcome.records.push(BuildRecord {
                plan: AssignPlan::Channel(plan.clone()),
                result,
            });
        }

        outcome
    }

    /// Build, log every record and return only the tasks
    pub fn create_segment_tasks(
        &self,
        ctx: &CancellationToken,
        source: Source,
        timeout: Duration,
        plans: &[SegmentAssignPlan],
    ) -> Vec<Task> {
        let outcome = self.build_segment_tasks(ctx, source, timeout, plans);
        outcome.emit();
        outcome.into_tasks()
    }

    /// Build, log every record and return only the tasks
    pub fn create_channel_tasks(
        &self,
        ctx: &CancellationToken,
        source: Source,
        timeout: Duration,
        plans: &[ChannelAssignPlan],
    ) -> Vec<Task> {
        let outcome = self.build_channel_tasks(ctx, source, timeout, plans);
        outcome.emit();
        outcome.into_tasks()
    }

    fn segment_task(
        &self,
        ctx: &CancellationToken,
        source: Source,
        timeout: Duration,
        plan: &SegmentAssignPlan,
    ) -> std::result::Result<Task, TaskError> {
        let segment = &plan.segment;
        let mut actions = Vec::with_capacity(2);
        if let Some(to) = plan.to {
            actions.push(Action::segment(
                to,
                ActionType::Grow,
                segment.insert_channel.clone(),
                segment.id,
                DataScope::Historical,
                segment.num_of_rows,
            ));
        }
        if let Some(from) = plan.from {
            actions.push(Action::segment(
                from,
                ActionType::Reduce,
                segment.insert_channel.clone(),
                segment.id,
                DataScope::Historical,
                segment.num_of_rows,
            ));
        }

        let header = TaskHeader {
            id: self.ids.allocate(),
            source,
            timeout,
            collection_id: segment.collection_id,
        };
        Task::new_segment_task(ctx, header, &plan.replica, plan.load_priority, actions)
    }

    fn channel_task(
        &self,
        ctx: &CancellationToken,
        source: Source,
        timeout: Duration,
        plan: &ChannelAssignPlan,
    ) -> std::result::Result<Task, TaskError> {
        let name = &plan.channel.channel_name;
        let mut actions = Vec::with_capacity(2);
        if let Some(to) = plan.to {
            actions.push(Action::channel(to, ActionType::Grow, name.clone()));
        }
        if let Some(from) = plan.from {
            actions.push(Action::channel(from, ActionType::Reduce, name.clone()));
        }

        let header = TaskHeader {
            id: self.ids.allocate(),
            source,
            timeout,
            collection_id: plan.channel.collection_id,
        };
        Task::new_channel_task(ctx, header, &plan.replica, actions)
    }
}
