//! Balance reports
//!
//! Text snapshots of plans and of the current distribution, logged before
//! and after a balance cycle. Operators and tooling grep these lines by
//! prefix and diff them over time, so the prefixes, field order and node
//! order are fixed: nodes ascend by id, segments keep their input order and
//! channels are sorted by name.

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use querycoord_meta::{
    ChannelDistribution, ChannelFilter, CollectionId, NodeId, Replica, ReplicaId, Segment,
    SegmentDistribution, SegmentFilter, SegmentId,
};
use serde::Serialize;
use tracing::info;

use crate::plan::{ChannelAssignPlan, SegmentAssignPlan};

pub const PLAN_INFO_PREFIX: &str = "Balance-Plans:";
pub const DIST_INFO_PREFIX: &str = "Balance-Dists:";

/// Render the plans of one balance round
pub fn balance_plans_report(
    collection_id: CollectionId,
    replica_id: ReplicaId,
    segment_plans: &[SegmentAssignPlan],
    channel_plans: &[ChannelAssignPlan],
) -> String {
    let mut out = format!(
        "{} new plans:{{collectionID:{}, replicaID:{}, ",
        PLAN_INFO_PREFIX, collection_id, replica_id
    );
    for plan in segment_plans {
        let _ = write!(out, "{}", plan);
    }
    for plan in channel_plans {
        let _ = write!(out, "{}", plan);
    }
    out.push('}');
    out
}

/// Log the plans of one balance round
pub fn print_new_balance_plans(
    collection_id: CollectionId,
    replica_id: ReplicaId,
    segment_plans: &[SegmentAssignPlan],
    channel_plans: &[ChannelAssignPlan],
) {
    info!(
        "{}",
        balance_plans_report(collection_id, replica_id, segment_plans, channel_plans)
    );
}

/// Segments being evacuated from one stopping node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoppingNodeSegments {
    pub node_id: NodeId,
    pub segment_ids: Vec<SegmentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentRows {
    pub segment_id: SegmentId,
    pub row_count: i64,
}

/// Segments loaded on one normal node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalNodeSegments {
    pub node_id: NodeId,
    pub segments: Vec<SegmentRows>,
    /// Rows served by the node across every collection
    pub node_row_sum: i64,
    /// Rows served by the node for the reported collection only
    pub node_collection_row_sum: i64,
}

/// Channels of the reported collection served by one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeChannels {
    pub node_id: NodeId,
    pub count: usize,
    pub channels: Vec<String>,
}

/// Distribution snapshot of one replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaDistReport {
    pub collection_id: CollectionId,
    pub replica_id: ReplicaId,
    pub stopping_segments: Vec<StoppingNodeSegments>,
    pub normal_segments: Vec<NormalNodeSegments>,
    pub stopping_channels: Vec<NodeChannels>,
    pub normal_channels: Vec<NodeChannels>,
}

impl ReplicaDistReport {
    /// Collect a snapshot from the given per-node segment lists and managers
    ///
    /// `stopping_node_segments` and `normal_node_segments` hold the replica's
    /// collection segments per node; row sums across all collections are
    /// read from `segment_dist`.
    pub fn collect(
        replica: &Replica,
        stopping_node_segments: &HashMap<NodeId, Vec<Segment>>,
        normal_node_segments: &HashMap<NodeId, Vec<Segment>>,
        channel_dist: &dyn ChannelDistribution,
        segment_dist: &dyn SegmentDistribution,
    ) -> Self {
        let stopping_nodes = sorted_nodes(stopping_node_segments);
        let normal_nodes = sorted_nodes(normal_node_segments);

        let stopping_segments = stopping_nodes
            .iter()
            .map(|node| StoppingNodeSegments {
                node_id: *node,
                segment_ids: stopping_node_segments[node].iter().map(|s| s.id).collect(),
            })
            .collect();

        let normal_segments = normal_nodes
            .iter()
            .map(|node| {
                let collection_segments = &normal_node_segments[node];
                let node_row_sum = segment_dist
                    .get_by_filter(&[SegmentFilter::Node(*node)])
                    .iter()
                    .map(|s| s.num_of_rows)
                    .sum();
                NormalNodeSegments {
                    node_id: *node,
                    segments: collection_segments
                        .iter()
                        .map(|s| SegmentRows {
                            segment_id: s.id,
                            row_count: s.num_of_rows,
                        })
                        .collect(),
                    node_row_sum,
                    node_collection_row_sum: collection_segments
                        .iter()
                        .map(|s| s.num_of_rows)
                        .sum(),
                }
            })
            .collect();

        let node_channels = |node: &NodeId| {
            let mut channels: Vec<String> = channel_dist
                .get_by_collection_and_filter(replica.collection_id, &[ChannelFilter::Node(*node)])
                .into_iter()
                .map(|ch| ch.channel_name)
                .collect();
            channels.sort();
            NodeChannels {
                node_id: *node,
                count: channels.len(),
                channels,
            }
        };

        Self {
            collection_id: replica.collection_id,
            replica_id: replica.id,
            stopping_segments,
            normal_segments,
            stopping_channels: stopping_nodes.iter().map(node_channels).collect(),
            normal_channels: normal_nodes.iter().map(node_channels).collect(),
        }
    }
}

fn sorted_nodes(by_node: &HashMap<NodeId, Vec<Segment>>) -> Vec<NodeId> {
    let mut nodes: Vec<NodeId> = by_node.keys().copied().collect();
    nodes.sort_unstable();
    nodes
}

fn write_channels(f: &mut fmt::Formatter<'_>, nodes: &[NodeChannels]) -> fmt::Result {
    for node in nodes {
        write!(f, "[nodeID:{}, count:{},channels:[", node.node_id, node.count)?;
        for channel in &node.channels {
            write!(f, "{},", channel)?;
        }
        write!(f, "]]")?;
    }
    Ok(())
}

impl fmt::Display for ReplicaDistReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {{collectionID:{}, replicaID:{}, ",
            DIST_INFO_PREFIX, self.collection_id, self.replica_id
        )?;

        write!(f, "[stoppingNodesSegmentDist:")?;
        for node in &self.stopping_segments {
            write!(f, "[nodeID:{}, stopped-segments:[", node.node_id)?;
            for id in &node.segment_ids {
                write!(f, "{},", id)?;
            }
            write!(f, "]]")?;
        }
        write!(f, "]")?;

        write!(f, "[normalNodesSegmentDist:")?;
        for node in &self.normal_segments {
            write!(f, "[nodeID:{}, loaded-segments:[", node.node_id)?;
            for segment in &node.segments {
                write!(
                    f,
                    "[segmentID: {}, rowCount: {}] ",
                    segment.segment_id, segment.row_count
                )?;
            }
            write!(
                f,
                "] nodeRowSum:{} nodeCollectionRowSum:{}]",
                node.node_row_sum, node.node_collection_row_sum
            )?;
        }
        write!(f, "]")?;

        write!(f, "[stoppingNodesChannelDist:")?;
        write_channels(f, &self.stopping_channels)?;
        write!(f, "]")?;

        write!(f, "[normalNodesChannelDist:")?;
        write_channels(f, &self.normal_channels)?;
        write!(f, "]")
    }
}

/// Collect and log the current distribution of a replica
pub fn print_current_replica_dist(
    replica: &Replica,
    stopping_node_segments: &HashMap<NodeId, Vec<Segment>>,
    normal_node_segments: &HashMap<NodeId, Vec<Segment>>,
    channel_dist: &dyn ChannelDistribution,
    segment_dist: &dyn SegmentDistribution,
) -> ReplicaDistReport {
    let report = ReplicaDistReport::collect(
        replica,
        stopping_node_segments,
        normal_node_segments,
        channel_dist,
        segment_dist,
    );
    info!("{}", report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use querycoord_meta::{ChannelDistManager, DmChannel, SegmentDistManager, SegmentLevel};

    fn make_segment(id: SegmentId, collection: CollectionId, rows: i64, node: NodeId) -> Segment {
        Segment {
            id,
            collection_id: collection,
            insert_channel: "ch-0".to_string(),
            num_of_rows: rows,
            level: SegmentLevel::L1,
            node,
        }
    }

    struct Fixture {
        replica: Replica,
        stopping: HashMap<NodeId, Vec<Segment>>,
        normal: HashMap<NodeId, Vec<Segment>>,
        segments: SegmentDistManager,
        channels: ChannelDistManager,
    }

    fn fixture() -> Fixture {
        let segments = SegmentDistManager::new();
        segments.update(1, vec![make_segment(1, 100, 100, 1), make_segment(9, 200, 500, 1)]);
        segments.update(2, vec![make_segment(2, 100, 50, 2)]);
        segments.update(3, vec![make_segment(3, 100, 30, 3)]);

        let channels = ChannelDistManager::new();
        channels.update(1, vec![DmChannel::new("ch-1", 100, 1), DmChannel::new("ch-0", 100, 1)]);
        channels.update(2, vec![DmChannel::new("other", 200, 2)]);
        channels.update(3, vec![DmChannel::new("ch-2", 100, 3)]);

        let mut normal = HashMap::new();
        normal.insert(2, vec![make_segment(2, 100, 50, 2)]);
        normal.insert(1, vec![make_segment(1, 100, 100, 1)]);

        let mut stopping = HashMap::new();
        stopping.insert(3, vec![make_segment(3, 100, 30, 3)]);

        Fixture {
            replica: Replica::new(1, 100, vec![1, 2, 3]),
            stopping,
            normal,
            segments,
            channels,
        }
    }

    fn collect(f: &Fixture) -> ReplicaDistReport {
        ReplicaDistReport::collect(&f.replica, &f.stopping, &f.normal, &f.channels, &f.segments)
    }

    #[test]
    fn test_dist_report_text() {
        let f = fixture();
        assert_eq!(
            collect(&f).to_string(),
            "Balance-Dists: {collectionID:100, replicaID:1, \
             [stoppingNodesSegmentDist:[nodeID:3, stopped-segments:[3,]]]\
             [normalNodesSegmentDist:\
             [nodeID:1, loaded-segments:[[segmentID: 1, rowCount: 100] ] nodeRowSum:600 nodeCollectionRowSum:100]\
             [nodeID:2, loaded-segments:[[segmentID: 2, rowCount: 50] ] nodeRowSum:50 nodeCollectionRowSum:50]]\
             [stoppingNodesChannelDist:[nodeID:3, count:1,channels:[ch-2,]]]\
             [normalNodesChannelDist:[nodeID:1, count:2,channels:[ch-0,ch-1,]][nodeID:2, count:0,channels:[]]]"
        );
    }

    #[test]
    fn test_row_sums_differ_for_shared_node() {
        let f = fixture();
        let report = collect(&f);
        let node1 = &report.normal_segments[0];
        assert_eq!(node1.node_id, 1);
        assert_eq!(node1.node_row_sum, 600);
        assert_eq!(node1.node_collection_row_sum, 100);
    }

    #[test]
    fn test_dist_report_is_deterministic() {
        let f = fixture();
        let first = collect(&f).to_string();
        for _ in 0..8 {
            assert_eq!(collect(&f).to_string(), first);
        }
    }

    #[test]
    fn test_dist_report_serializes() {
        let f = fixture();
        let json = serde_json::to_value(collect(&f)).unwrap();
        assert_eq!(json["replica_id"], 1);
        assert_eq!(json["normal_channels"][0]["count"], 2);
    }

    #[test]
    fn test_empty_dist_report() {
        let f = fixture();
        let report = ReplicaDistReport::collect(
            &f.replica,
            &HashMap::new(),
            &HashMap::new(),
            &f.channels,
            &f.segments,
        );
        assert_eq!(
            report.to_string(),
            "Balance-Dists: {collectionID:100, replicaID:1, [stoppingNodesSegmentDist:][normalNodesSegmentDist:][stoppingNodesChannelDist:][normalNodesChannelDist:]"
        );
    }

    #[test]
    fn test_plans_report() {
        let replica = Replica::new(1, 100, vec![1, 3]);
        let segment_plans = vec![SegmentAssignPlan::new(
            replica.clone(),
            make_segment(3, 100, 30, 3),
            Some(3),
            Some(1),
        )];
        let channel_plans = vec![ChannelAssignPlan::new(
            replica,
            DmChannel::new("ch-2", 100, 3),
            Some(3),
            Some(1),
        )];

        let report = balance_plans_report(100, 1, &segment_plans, &channel_plans);
        let head = "Balance-Plans: new plans:{collectionID:100, replicaID:1, SegmentPlan:";
        assert!(report.starts_with(head));
        assert!(report.contains("segmentID: 3, from: 3, to: 1"));
        assert!(report.contains(
            "ChannelPlan:[collectionID: 100, channel: ch-2, replicaID: 1, from: 3, to: 1]"
        ));
        assert!(report.ends_with('}'));
        assert_eq!(report, balance_plans_report(100, 1, &segment_plans, &channel_plans));
    }
}
