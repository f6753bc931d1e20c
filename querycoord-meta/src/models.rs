//! Distribution model for the query coordinator
//!
//! Plain value types describing who serves what: worker nodes, replicas,
//! sealed segments and DML channels.

use serde::{Deserialize, Serialize};

/// Worker node identifier
pub type NodeId = i64;

/// Collection identifier
pub type CollectionId = i64;

/// Replica identifier
pub type ReplicaId = i64;

/// Segment identifier
pub type SegmentId = i64;

/// Node lifecycle state as seen by the balancer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Normal,
    /// Node is draining and should be evacuated
    Stopping,
}

impl Default for NodeState {
    fn default() -> Self {
        Self::Normal
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Storage tier of a sealed segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentLevel {
    Legacy,
    L0,
    L1,
    L2,
}

impl Default for SegmentLevel {
    fn default() -> Self {
        Self::Legacy
    }
}

impl std::fmt::Display for SegmentLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => write!(f, "Legacy"),
            Self::L0 => write!(f, "L0"),
            Self::L1 => write!(f, "L1"),
            Self::L2 => write!(f, "L2"),
        }
    }
}

/// A set of nodes jointly serving one full copy of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub id: ReplicaId,
    pub collection_id: CollectionId,
    /// Nodes currently assigned to this replica
    #[serde(default)]
    pub nodes: Vec<NodeId>,
}

impl Replica {
    pub fn new(id: ReplicaId, collection_id: CollectionId, nodes: Vec<NodeId>) -> Self {
        Self {
            id,
            collection_id,
            nodes,
        }
    }

    /// Check whether a node belongs to this replica
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }
}

/// A sealed segment as currently loaded on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub collection_id: CollectionId,
    /// DML channel the segment was written through
    pub insert_channel: String,
    pub num_of_rows: i64,
    #[serde(default)]
    pub level: SegmentLevel,
    /// Node currently serving the segment
    pub node: NodeId,
}

/// A DML channel as currently subscribed on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmChannel {
    pub channel_name: String,
    pub collection_id: CollectionId,
    /// Node currently serving the channel
    pub node: NodeId,
}

impl DmChannel {
    pub fn new(channel_name: impl Into<String>, collection_id: CollectionId, node: NodeId) -> Self {
        Self {
            channel_name: channel_name.into(),
            collection_id,
            node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_level_display() {
        assert_eq!(SegmentLevel::L0.to_string(), "L0");
        assert_eq!(SegmentLevel::default().to_string(), "Legacy");
    }

    #[test]
    fn test_replica_contains() {
        let replica = Replica::new(1, 100, vec![1, 2]);
        assert!(replica.contains(2));
        assert!(!replica.contains(3));
    }

    #[test]
    fn test_segment_deserialize_defaults_level() {
        let json = r#"{"id":7,"collection_id":100,"insert_channel":"ch-0","num_of_rows":30,"node":3}"#;
        let segment: Segment = serde_json::from_str(json).unwrap();
        assert_eq!(segment.level, SegmentLevel::Legacy);
        assert_eq!(segment.node, 3);
    }

    #[test]
    fn test_node_state_lowercase() {
        let state: NodeState = serde_json::from_str("\"stopping\"").unwrap();
        assert_eq!(state, NodeState::Stopping);
    }
}
