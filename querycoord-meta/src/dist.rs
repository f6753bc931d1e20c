//! Segment and channel distribution
//!
//! Read-only query interfaces over "which node serves what", plus in-memory
//! managers that back them. Node ids are kept in a `BTreeMap` so every query
//! walks nodes in ascending order and returns results in a stable order.

use crate::models::{CollectionId, DmChannel, NodeId, Segment, SegmentId};
use crate::{MetaError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// Predicate over loaded segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentFilter {
    Node(NodeId),
    Collection(CollectionId),
    Channel(String),
    Segment(SegmentId),
}

impl SegmentFilter {
    pub fn matches(&self, segment: &Segment) -> bool {
        match self {
            Self::Node(node) => segment.node == *node,
            Self::Collection(collection) => segment.collection_id == *collection,
            Self::Channel(channel) => segment.insert_channel == *channel,
            Self::Segment(id) => segment.id == *id,
        }
    }
}

/// Predicate over subscribed channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFilter {
    Node(NodeId),
    Channel(String),
}

impl ChannelFilter {
    pub fn matches(&self, channel: &DmChannel) -> bool {
        match self {
            Self::Node(node) => channel.node == *node,
            Self::Channel(name) => channel.channel_name == *name,
        }
    }
}

/// Query interface over segment ownership
pub trait SegmentDistribution: Send + Sync {
    /// Segments matching every filter; an empty filter list matches all
    fn get_by_filter(&self, filters: &[SegmentFilter]) -> Vec<Segment>;
}

/// Query interface over channel ownership
pub trait ChannelDistribution: Send + Sync {
    /// Channels matching every filter; an empty filter list matches all
    fn get_by_filter(&self, filters: &[ChannelFilter]) -> Vec<DmChannel>;

    /// Channels of one collection matching every filter
    fn get_by_collection_and_filter(
        &self,
        collection: CollectionId,
        filters: &[ChannelFilter],
    ) -> Vec<DmChannel> {
        self.get_by_filter(filters)
            .into_iter()
            .filter(|ch| ch.collection_id == collection)
            .collect()
    }
}

/// In-memory segment distribution keyed by serving node
#[derive(Debug, Default)]
pub struct SegmentDistManager {
    segments: RwLock<BTreeMap<NodeId, Vec<Segment>>>,
}

impl SegmentDistManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything a node serves
    ///
    /// Segments are re-tagged with `node` so the node index and the
    /// segment's own `node` field never disagree.
    pub fn update(&self, node: NodeId, segments: Vec<Segment>) {
        let segments: Vec<Segment> = segments
            .into_iter()
            .map(|mut s| {
                s.node = node;
                s
            })
            .collect();

        debug!(node, count = segments.len(), "Updated segment distribution");
        self.segments.write().insert(node, segments);
    }

    /// Drop a node from the distribution
    pub fn remove_node(&self, node: NodeId) -> Result<()> {
        self.segments
            .write()
            .remove(&node)
            .map(|_| ())
            .ok_or(MetaError::NodeNotFound(node))
    }

    /// Nodes that currently serve at least one segment
    pub fn nodes(&self) -> Vec<NodeId> {
        self.segments
            .read()
            .iter()
            .filter(|(_, segments)| !segments.is_empty())
            .map(|(node, _)| *node)
            .collect()
    }
}

impl SegmentDistribution for SegmentDistManager {
    fn get_by_filter(&self, filters: &[SegmentFilter]) -> Vec<Segment> {
        self.segments
            .read()
            .values()
            .flatten()
            .filter(|s| filters.iter().all(|f| f.matches(s)))
            .cloned()
            .collect()
    }
}

/// In-memory channel distribution keyed by serving node
#[derive(Debug, Default)]
pub struct ChannelDistManager {
    channels: RwLock<BTreeMap<NodeId, Vec<DmChannel>>>,
}

impl ChannelDistManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every channel a node serves
    pub fn update(&self, node: NodeId, channels: Vec<DmChannel>) {
        let channels: Vec<DmChannel> = channels
            .into_iter()
            .map(|mut ch| {
                ch.node = node;
                ch
            })
            .collect();

        debug!(node, count = channels.len(), "Updated channel distribution");
        self.channels.write().insert(node, channels);
    }

    /// Drop a node from the distribution
    pub fn remove_node(&self, node: NodeId) -> Result<()> {
        self.channels
            .write()
            .remove(&node)
            .map(|_| ())
            .ok_or(MetaError::NodeNotFound(node))
    }
}

impl ChannelDistribution for ChannelDistManager {
    fn get_by_filter(&self, filters: &[ChannelFilter]) -> Vec<DmChannel> {
        self.channels
            .read()
            .values()
            .flatten()
            .filter(|ch| filters.iter().all(|f| f.matches(ch)))
            .cloned()
            .collect()
    }
}
