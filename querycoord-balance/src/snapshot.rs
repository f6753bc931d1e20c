//! Balance cycle snapshot
//!
//! A JSON description of one replica's distribution plus the plans a
//! balancer produced for it. Used by the `querycoord-balance` binary to
//! replay a cycle offline.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use querycoord_meta::{
    ChannelDistManager, DmChannel, NodeId, NodeState, Replica, Segment, SegmentDistManager,
    SegmentId,
};
use serde::Deserialize;
use thiserror::Error;

use crate::colocation::StaticWalLocator;
use crate::plan::{node_or_none, ChannelAssignPlan, SegmentAssignPlan};
use crate::task::LoadPriority;

/// Snapshot loading errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Plan references unknown segment: {0}")]
    UnknownSegment(SegmentId),

    #[error("Plan references unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid plan node {0}: expected a node id or -1")]
    InvalidNode(i64),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Plan endpoint from its snapshot form; only `-1` means "no node"
fn plan_node(raw: i64) -> Result<Option<NodeId>> {
    if raw < -1 {
        return Err(SnapshotError::InvalidNode(raw));
    }
    Ok(node_or_none(raw))
}

/// Segment plan as written in a snapshot, with `-1` for a missing node
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentPlanEntry {
    pub segment_id: SegmentId,
    pub from: i64,
    pub to: i64,
    #[serde(default)]
    pub load_priority: LoadPriority,
}

/// Channel plan as written in a snapshot, with `-1` for a missing node
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelPlanEntry {
    pub channel: String,
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceSnapshot {
    pub replica: Replica,
    /// Node states; nodes not listed are normal
    #[serde(default)]
    pub node_states: BTreeMap<NodeId, NodeState>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub channels: Vec<DmChannel>,
    /// Channel name to the node hosting its WAL
    #[serde(default)]
    pub wal_locations: BTreeMap<String, NodeId>,
    #[serde(default)]
    pub segment_plans: Vec<SegmentPlanEntry>,
    #[serde(default)]
    pub channel_plans: Vec<ChannelPlanEntry>,
}

impl BalanceSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn node_state(&self, node: NodeId) -> NodeState {
        self.node_states.get(&node).copied().unwrap_or_default()
    }

    /// Load every segment and channel into the distribution managers
    pub fn populate(&self, segments: &SegmentDistManager, channels: &ChannelDistManager) {
        let mut segments_by_node: BTreeMap<NodeId, Vec<Segment>> = BTreeMap::new();
        for segment in &self.segments {
            segments_by_node
                .entry(segment.node)
                .or_default()
                .push(segment.clone());
        }
        for (node, list) in segments_by_node {
            segments.update(node, list);
        }

        let mut channels_by_node: BTreeMap<NodeId, Vec<DmChannel>> = BTreeMap::new();
        for channel in &self.channels {
            channels_by_node
                .entry(channel.node)
                .or_default()
                .push(channel.clone());
        }
        for (node, list) in channels_by_node {
            channels.update(node, list);
        }
    }

    pub fn wal_locator(&self) -> StaticWalLocator {
        self.wal_locations
            .iter()
            .map(|(ch, node)| (ch.clone(), *node))
            .collect()
    }

    /// The replica's collection segments grouped by node, for nodes in `state`
    pub fn node_segments(&self, state: NodeState) -> HashMap<NodeId, Vec<Segment>> {
        let mut by_node: HashMap<NodeId, Vec<Segment>> = self
            .replica
            .nodes
            .iter()
            .filter(|node| self.node_state(**node) == state)
            .map(|node| (*node, Vec::new()))
            .collect();

        for segment in &self.segments {
            if segment.collection_id != self.replica.collection_id {
                continue;
            }
            if let Some(list) = by_node.get_mut(&segment.node) {
                list.push(segment.clone());
            }
        }
        by_node
    }

    /// Channels of the replica's collection, in snapshot order
    pub fn replica_channels(&self) -> Vec<DmChannel> {
        self.channels
            .iter()
            .filter(|ch| {
                ch.collection_id == self.replica.collection_id && self.replica.contains(ch.node)
            })
            .cloned()
            .collect()
    }

    pub fn resolve_segment_plans(&self) -> Result<Vec<SegmentAssignPlan>> {
        self.segment_plans
            .iter()
            .map(|entry| {
                let segment = self
                    .segments
                    .iter()
                    .find(|s| s.id == entry.segment_id)
                    .cloned()
                    .ok_or(SnapshotError::UnknownSegment(entry.segment_id))?;
                Ok(SegmentAssignPlan::new(
                    self.replica.clone(),
                    segment,
                    plan_node(entry.from)?,
                    plan_node(entry.to)?,
                )
                .with_load_priority(entry.load_priority))
            })
            .collect()
    }

    pub fn resolve_channel_plans(&self) -> Result<Vec<ChannelAssignPlan>> {
        self.channel_plans
            .iter()
            .map(|entry| {
                let channel = self
                    .channels
                    .iter()
                    .find(|ch| ch.channel_name == entry.channel)
                    .cloned()
                    .ok_or_else(|| SnapshotError::UnknownChannel(entry.channel.clone()))?;
                Ok(ChannelAssignPlan::new(
                    self.replica.clone(),
                    channel,
                    plan_node(entry.from)?,
                    plan_node(entry.to)?,
                ))
            })
            .collect()
    }
}
