//! Query Coordinator Distribution Metadata
//!
//! Describes how segments and channels are spread across worker nodes and
//! exposes the read-only queries the balancer layer depends on.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  models                        │
//! │   Replica · Segment · DmChannel · NodeState    │
//! └───────────────────────────────────────────────┘
//!                        │
//! ┌───────────────────────────────────────────────┐
//! │                   dist                         │
//! │  SegmentDistribution   ChannelDistribution     │
//! │  (SegmentDistManager)  (ChannelDistManager)    │
//! └───────────────────────────────────────────────┘
//! ```

pub mod dist;
pub mod models;

pub use dist::{
    ChannelDistManager, ChannelDistribution, ChannelFilter, SegmentDistManager,
    SegmentDistribution, SegmentFilter,
};
pub use models::*;

use thiserror::Error;

/// Distribution metadata errors
#[derive(Error, Debug)]
pub enum MetaError {
    #[error("Node not found in distribution: {0}")]
    NodeNotFound(NodeId),
}

pub type Result<T> = std::result::Result<T, MetaError>;
