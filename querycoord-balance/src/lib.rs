//! Query Coordinator Balance Tasks
//!
//! This crate turns balancer decisions into work for the task scheduler.
//!
//! It provides:
//! - Plan model (segment and channel moves between nodes)
//! - Task factory (ordered Grow/Reduce actions with a derived priority)
//! - WAL colocation ordering for channel candidates
//! - Deterministic plan and distribution reports for the balance log

pub mod colocation;
pub mod config;
pub mod factory;
pub mod plan;
pub mod report;
pub mod scheduler;
pub mod snapshot;
pub mod task;

// Re-export main types
pub use colocation::{
    colocation_weight, sort_channels_by_colocation, ColocationSorter, StaticWalLocator, WalLocator,
};
pub use config::{BalanceConfig, ConfigError};
pub use factory::{priority_for, BuildOutcome, BuildRecord, TaskFactory};
pub use plan::{AssignPlan, ChannelAssignPlan, SegmentAssignPlan};
pub use report::{
    balance_plans_report, print_current_replica_dist, print_new_balance_plans, ReplicaDistReport,
    DIST_INFO_PREFIX, PLAN_INFO_PREFIX,
};
pub use scheduler::{submit_tasks, SchedulerError, TaskScheduler};
pub use snapshot::{BalanceSnapshot, SnapshotError};
pub use task::{
    Action, ActionTarget, ActionType, DataScope, LoadPriority, Source, Task, TaskError, TaskId,
    TaskIdAllocator, TaskKind, TaskPriority, TaskStatus, TaskType,
};
