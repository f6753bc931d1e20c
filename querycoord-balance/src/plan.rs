//! Balance plans
//!
//! A plan is one proposed move produced by the balancer for a single
//! segment or channel. `from == None` means a pure acquisition, `to == None`
//! a pure release. Every textual rendering prints a missing node as `-1`.

use std::fmt;

use querycoord_meta::{CollectionId, DmChannel, NodeId, Replica, Segment};

use crate::task::LoadPriority;

/// Map the `-1` wire sentinel to `None`; any other value is a node id
pub fn node_or_none(node: i64) -> Option<NodeId> {
    if node == -1 {
        None
    } else {
        Some(node)
    }
}

/// Render an optional node with the `-1` sentinel
pub fn node_or_sentinel(node: Option<NodeId>) -> i64 {
    node.unwrap_or(-1)
}

/// Proposed move of one segment within a replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentAssignPlan {
    pub replica: Replica,
    pub segment: Segment,
    pub from: Option<NodeId>,
    pub to: Option<NodeId>,
    pub load_priority: LoadPriority,
    /// Balancer scores, carried for diagnostics only
    pub from_score: i64,
    pub to_score: i64,
    pub segment_score: i64,
}

impl SegmentAssignPlan {
    pub fn new(
        replica: Replica,
        segment: Segment,
        from: Option<NodeId>,
        to: Option<NodeId>,
    ) -> Self {
        Self {
            replica,
            segment,
            from,
            to,
            load_priority: LoadPriority::default(),
            from_score: 0,
            to_score: 0,
            segment_score: 0,
        }
    }

    pub fn with_load_priority(mut self, load_priority: LoadPriority) -> Self {
        self.load_priority = load_priority;
        self
    }

    pub fn with_scores(mut self, from_score: i64, to_score: i64, segment_score: i64) -> Self {
        self.from_score = from_score;
        self.to_score = to_score;
        self.segment_score = segment_score;
        self
    }
}

impl fmt::Display for SegmentAssignPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "SegmentPlan:[collectionID: {}, replicaID: {}, segmentID: {}, from: {}, to: {}, fromScore: {}, toScore: {}, segmentScore: {}]",
            self.segment.collection_id,
            self.replica.id,
            self.segment.id,
            node_or_sentinel(self.from),
            node_or_sentinel(self.to),
            self.from_score,
            self.to_score,
            self.segment_score
        )
    }
}

/// Proposed move of one channel within a replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAssignPlan {
    pub replica: Replica,
    pub channel: DmChannel,
    pub from: Option<NodeId>,
    pub to: Option<NodeId>,
}

impl ChannelAssignPlan {
    pub fn new(
        replica: Replica,
        channel: DmChannel,
        from: Option<NodeId>,
        to: Option<NodeId>,
    ) -> Self {
        Self {
            replica,
            channel,
            from,
            to,
        }
    }
}

impl fmt::Display for ChannelAssignPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ChannelPlan:[collectionID: {}, channel: {}, replicaID: {}, from: {}, to: {}]",
            self.channel.collection_id,
            self.channel.channel_name,
            self.replica.id,
            node_or_sentinel(self.from),
            node_or_sentinel(self.to)
        )
    }
}

/// Either kind of plan, as recorded by the task factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignPlan {
    Segment(SegmentAssignPlan),
    Channel(ChannelAssignPlan),
}

impl AssignPlan {
    pub fn collection_id(&self) -> CollectionId {
        match self {
            Self::Segment(p) => p.segment.collection_id,
            Self::Channel(p) => p.channel.collection_id,
        }
    }

    pub fn replica(&self) -> &Replica {
        match self {
            Self::Segment(p) => &p.replica,
            Self::Channel(p) => &p.replica,
        }
    }

    pub fn from(&self) -> Option<NodeId> {
        match self {
            Self::Segment(p) => p.from,
            Self::Channel(p) => p.from,
        }
    }

    pub fn to(&self) -> Option<NodeId> {
        match self {
            Self::Segment(p) => p.to,
            Self::Channel(p) => p.to,
        }
    }

    /// Channel the plan's entity flows through
    pub fn channel_name(&self) -> &str {
        match self {
            Self::Segment(p) => &p.segment.insert_channel,
            Self::Channel(p) => &p.channel.channel_name,
        }
    }
}

impl fmt::Display for AssignPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segment(p) => fmt::Display::fmt(p, f),
            Self::Channel(p) => fmt::Display::fmt(p, f),
        }
    }
}
