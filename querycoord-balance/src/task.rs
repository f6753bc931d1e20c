//! Balance tasks
//!
//! A task is the unit handed to the scheduler: an ordered list of actions
//! against one segment or one channel, tagged with a source, a priority and
//! an execution timeout. Tasks are built once and only ever leave this
//! crate in the `Pending` state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use querycoord_meta::{CollectionId, NodeId, Replica, ReplicaId, SegmentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Task construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task has no actions")]
    EmptyActions,

    #[error("Replica {replica} belongs to collection {replica_collection}, not {collection}")]
    CollectionMismatch {
        replica: ReplicaId,
        replica_collection: CollectionId,
        collection: CollectionId,
    },

    #[error("Actions in one task target different entities: {0}")]
    InconsistentActions(String),

    #[error("Task timeout must be greater than zero")]
    InvalidTimeout,

    #[error("Actions must be Grow, Reduce or Grow then Reduce, got [{0}]")]
    InvalidActionOrder(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;

pub type TaskId = u64;

/// Which component asked for the task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Balancer,
    Checker,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Balancer => write!(f, "balancer"),
            Self::Checker => write!(f, "checker"),
        }
    }
}

/// Scheduling priority, ordered `Low < Normal < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Load priority requested by the balancer for segment loads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPriority {
    High,
    Low,
}

impl Default for LoadPriority {
    fn default() -> Self {
        Self::Low
    }
}

impl LoadPriority {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::High => 0,
            Self::Low => 1,
        }
    }
}

/// Scheduler-side lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Grow,
    Reduce,
}

/// Data tier an action applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataScope {
    All,
    Streaming,
    Historical,
}

/// What an action operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionTarget {
    Segment {
        segment_id: SegmentId,
        channel: String,
        scope: DataScope,
        row_count: i64,
    },
    Channel {
        channel_name: String,
    },
}

/// One atomic directive against one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub node: NodeId,
    pub target: ActionTarget,
}

impl Action {
    pub fn segment(
        node: NodeId,
        action_type: ActionType,
        channel: impl Into<String>,
        segment_id: SegmentId,
        scope: DataScope,
        row_count: i64,
    ) -> Self {
        Self {
            action_type,
            node,
            target: ActionTarget::Segment {
                segment_id,
                channel: channel.into(),
                scope,
                row_count,
            },
        }
    }

    pub fn channel(node: NodeId, action_type: ActionType, channel_name: impl Into<String>) -> Self {
        Self {
            action_type,
            node,
            target: ActionTarget::Channel {
                channel_name: channel_name.into(),
            },
        }
    }

    pub fn is_grow(&self) -> bool {
        self.action_type == ActionType::Grow
    }

    pub fn is_reduce(&self) -> bool {
        self.action_type == ActionType::Reduce
    }

    /// Channel the action is routed through
    pub fn shard(&self) -> &str {
        match &self.target {
            ActionTarget::Segment { channel, .. } => channel,
            ActionTarget::Channel { channel_name } => channel_name,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.action_type {
            ActionType::Grow => "Grow",
            ActionType::Reduce => "Reduce",
        };
        match &self.target {
            ActionTarget::Segment {
                segment_id,
                scope,
                row_count,
                ..
            } => write!(
                f,
                "{}(node={}, segment={}, scope={:?}, rows={})",
                verb, self.node, segment_id, scope, row_count
            ),
            ActionTarget::Channel { channel_name } => {
                write!(f, "{}(node={}, channel={})", verb, self.node, channel_name)
            }
        }
    }
}

/// Entity kind a task operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Segment,
    Channel,
}

/// Shape of a task, derived from its actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Grow only
    Load,
    /// Reduce only
    Release,
    /// Grow on the destination, then Reduce on the source
    Move,
}

/// Monotonic task id source, shared across factories via `Arc`
#[derive(Debug)]
pub struct TaskIdAllocator {
    next: AtomicU64,
}

impl Default for TaskIdAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl TaskIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> TaskId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Fields shared by segment and channel tasks
#[derive(Debug, Clone, Copy)]
pub struct TaskHeader {
    pub id: TaskId,
    pub source: Source,
    pub timeout: Duration,
    pub collection_id: CollectionId,
}

/// A unit of work for the scheduler
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    collection_id: CollectionId,
    replica_id: ReplicaId,
    shard: String,
    actions: Vec<Action>,
    timeout: Duration,
    source: Source,
    priority: TaskPriority,
    load_priority: LoadPriority,
    status: TaskStatus,
    cancel: CancellationToken,
}

impl Task {
    /// Build a task over a single segment
    pub fn new_segment_task(
        ctx: &CancellationToken,
        header: TaskHeader,
        replica: &Replica,
        load_priority: LoadPriority,
        actions: Vec<Action>,
    ) -> Result<Self> {
        let mut segment_id = None;
        for action in &actions {
            match &action.target {
                ActionTarget::Segment { segment_id: id, .. } => match segment_id {
                    None => segment_id = Some(*id),
                    Some(first) if first != *id => {
                        return Err(TaskError::InconsistentActions(format!(
                            "segment {} and segment {}",
                            first, id
                        )));
                    }
                    Some(_) => {}
                },
                ActionTarget::Channel { channel_name } => {
                    return Err(TaskError::InconsistentActions(format!(
                        "channel action {} in segment task",
                        channel_name
                    )));
                }
            }
        }

        Self::new_base(ctx, header, replica, load_priority, actions)
    }

    /// Build a task over a single channel
    pub fn new_channel_task(
        ctx: &CancellationToken,
        header: TaskHeader,
        replica: &Replica,
        actions: Vec<Action>,
    ) -> Result<Self> {
        let mut channel: Option<&str> = None;
        for action in &actions {
            match &action.target {
                ActionTarget::Channel { channel_name } => match channel {
                    None => channel = Some(channel_name.as_str()),
                    Some(first) if first != channel_name.as_str() => {
                        return Err(TaskError::InconsistentActions(format!(
                            "channel {} and channel {}",
                            first, channel_name
                        )));
                    }
                    Some(_) => {}
                },
                ActionTarget::Segment { segment_id, .. } => {
                    return Err(TaskError::InconsistentActions(format!(
                        "segment action {} in channel task",
                        segment_id
                    )));
                }
            }
        }

        Self::new_base(ctx, header, replica, LoadPriority::default(), actions)
    }

    fn new_base(
        ctx: &CancellationToken,
        header: TaskHeader,
        replica: &Replica,
        load_priority: LoadPriority,
        actions: Vec<Action>,
    ) -> Result<Self> {
        if header.timeout.is_zero() {
            return Err(TaskError::InvalidTimeout);
        }

        let shard = match actions.first() {
            Some(action) => action.shard().to_string(),
            None => return Err(TaskError::EmptyActions),
        };

        let ordered = match actions.as_slice() {
            [_] => true,
            [first, second] => first.is_grow() && second.is_reduce(),
            _ => false,
        };
        if !ordered {
            let types: Vec<String> = actions
                .iter()
                .map(|a| format!("{:?}", a.action_type))
                .collect();
            return Err(TaskError::InvalidActionOrder(types.join(", ")));
        }

        if replica.collection_id != header.collection_id {
            return Err(TaskError::CollectionMismatch {
                replica: replica.id,
                replica_collection: replica.collection_id,
                collection: header.collection_id,
            });
        }

        Ok(Self {
            id: header.id,
            collection_id: header.collection_id,
            replica_id: replica.id,
            shard,
            actions,
            timeout: header.timeout,
            source: header.source,
            priority: TaskPriority::default(),
            load_priority,
            status: TaskStatus::Pending,
            cancel: ctx.child_token(),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    pub fn shard(&self) -> &str {
        &self.shard
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Deadline for executing the task, not for building it
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: TaskPriority) {
        self.priority = priority;
    }

    pub fn load_priority(&self) -> LoadPriority {
        self.load_priority
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn kind(&self) -> TaskKind {
        match self.actions.first().map(|a| &a.target) {
            Some(ActionTarget::Channel { .. }) => TaskKind::Channel,
            _ => TaskKind::Segment,
        }
    }

    pub fn task_type(&self) -> TaskType {
        let grow = self.actions.iter().any(Action::is_grow);
        let reduce = self.actions.iter().any(Action::is_reduce);
        match (grow, reduce) {
            (true, true) => TaskType::Move,
            (true, false) => TaskType::Load,
            _ => TaskType::Release,
        }
    }

    /// Cancel this task; the parent balance context is unaffected
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[id={}, collection={}, replica={}, shard={}, type={:?}, priority={:?}, source={}, actions=[",
            self.id,
            self.collection_id,
            self.replica_id,
            self.shard,
            self.task_type(),
            self.priority,
            self.source
        )?;
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", action)?;
        }
        write!(f, "]]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(id: TaskId) -> TaskHeader {
        TaskHeader {
            id,
            source: Source::Balancer,
            timeout: Duration::from_secs(10),
            collection_id: 100,
        }
    }

    fn grow(node: NodeId, segment: SegmentId) -> Action {
        Action::segment(node, ActionType::Grow, "ch-0", segment, DataScope::Historical, 10)
    }

    fn reduce(node: NodeId, segment: SegmentId) -> Action {
        Action::segment(node, ActionType::Reduce, "ch-0", segment, DataScope::Historical, 10)
    }

    #[test]
    fn test_task_type_from_actions() {
        let ctx = CancellationToken::new();
        let replica = Replica::new(1, 100, vec![1, 2]);

        let moved = Task::new_segment_task(
            &ctx,
            header(1),
            &replica,
            LoadPriority::Low,
            vec![grow(1, 7), reduce(2, 7)],
        )
        .unwrap();
        assert_eq!(moved.task_type(), TaskType::Move);
        assert_eq!(moved.kind(), TaskKind::Segment);
        assert_eq!(moved.shard(), "ch-0");
        assert_eq!(moved.status(), TaskStatus::Pending);

        let load =
            Task::new_segment_task(&ctx, header(2), &replica, LoadPriority::Low, vec![grow(1, 7)])
                .unwrap();
        assert_eq!(load.task_type(), TaskType::Load);

        let release = Task::new_segment_task(
            &ctx,
            header(3),
            &replica,
            LoadPriority::Low,
            vec![reduce(2, 7)],
        )
        .unwrap();
        assert_eq!(release.task_type(), TaskType::Release);
    }

    #[test]
    fn test_empty_actions_rejected() {
        let ctx = CancellationToken::new();
        let replica = Replica::new(1, 100, vec![]);
        let err = Task::new_channel_task(&ctx, header(1), &replica, vec![]).unwrap_err();
        assert_eq!(err, TaskError::EmptyActions);
    }

    #[test]
    fn test_collection_mismatch_rejected() {
        let ctx = CancellationToken::new();
        let replica = Replica::new(1, 200, vec![]);
        let err = Task::new_segment_task(
            &ctx,
            header(1),
            &replica,
            LoadPriority::Low,
            vec![grow(1, 7)],
        )
        .unwrap_err();
        assert!(matches!(err, TaskError::CollectionMismatch { collection: 100, .. }));
    }

    #[test]
    fn test_mixed_segments_rejected() {
        let ctx = CancellationToken::new();
        let replica = Replica::new(1, 100, vec![]);
        let err = Task::new_segment_task(
            &ctx,
            header(1),
            &replica,
            LoadPriority::Low,
            vec![grow(1, 7), reduce(2, 8)],
        )
        .unwrap_err();
        assert!(matches!(err, TaskError::InconsistentActions(_)));

        let err = Task::new_channel_task(
            &ctx,
            header(2),
            &replica,
            vec![Action::channel(1, ActionType::Grow, "a"), grow(1, 7)],
        )
        .unwrap_err();
        assert!(matches!(err, TaskError::InconsistentActions(_)));
    }

    #[test]
    fn test_action_order_enforced() {
        let ctx = CancellationToken::new();
        let replica = Replica::new(1, 100, vec![]);
        let build = |actions| {
            Task::new_segment_task(&ctx, header(1), &replica, LoadPriority::Low, actions)
        };

        let err = build(vec![reduce(3, 7), grow(1, 7)]).unwrap_err();
        assert_eq!(err, TaskError::InvalidActionOrder("Reduce, Grow".to_string()));

        let err = build(vec![grow(1, 7), grow(2, 7), reduce(3, 7)]).unwrap_err();
        assert!(matches!(err, TaskError::InvalidActionOrder(_)));

        let err = build(vec![reduce(2, 7), reduce(3, 7)]).unwrap_err();
        assert!(matches!(err, TaskError::InvalidActionOrder(_)));

        let err = Task::new_channel_task(
            &ctx,
            header(2),
            &replica,
            vec![
                Action::channel(2, ActionType::Reduce, "a"),
                Action::channel(1, ActionType::Grow, "a"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, TaskError::InvalidActionOrder(_)));

        assert!(build(vec![grow(1, 7), reduce(3, 7)]).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let ctx = CancellationToken::new();
        let replica = Replica::new(1, 100, vec![]);
        let mut h = header(1);
        h.timeout = Duration::ZERO;
        let err = Task::new_channel_task(
            &ctx,
            h,
            &replica,
            vec![Action::channel(1, ActionType::Grow, "a")],
        )
        .unwrap_err();
        assert_eq!(err, TaskError::InvalidTimeout);
    }

    #[test]
    fn test_cancel_follows_parent_only() {
        let ctx = CancellationToken::new();
        let replica = Replica::new(1, 100, vec![]);
        let a = Task::new_channel_task(
            &ctx,
            header(1),
            &replica,
            vec![Action::channel(1, ActionType::Grow, "a")],
        )
        .unwrap();
        let b = Task::new_channel_task(
            &ctx,
            header(2),
            &replica,
            vec![Action::channel(2, ActionType::Grow, "b")],
        )
        .unwrap();

        a.cancel();
        assert!(a.is_canceled());
        assert!(!b.is_canceled());
        assert!(!ctx.is_cancelled());

        ctx.cancel();
        assert!(b.is_canceled());
    }

    #[test]
    fn test_id_allocator_increments() {
        let ids = TaskIdAllocator::new();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Low < TaskPriority::Normal);
        assert!(TaskPriority::Normal < TaskPriority::High);
    }

    #[test]
    fn test_task_display() {
        let ctx = CancellationToken::new();
        let replica = Replica::new(1, 100, vec![]);
        let task = Task::new_channel_task(
            &ctx,
            header(5),
            &replica,
            vec![Action::channel(1, ActionType::Grow, "ch-0")],
        )
        .unwrap();
        let rendered = task.to_string();
        assert!(rendered.contains("id=5"));
        assert!(rendered.contains("Grow(node=1, channel=ch-0)"));
    }
}
