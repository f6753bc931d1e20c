//! WAL-aware channel ordering
//!
//! With the streaming service on, each channel's write-ahead log lives on
//! one node. A channel served by that same node is colocated; moving it away
//! adds a network hop to every write. Candidate lists are consumed from the
//! head, so colocated channels are pushed to the tail.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use querycoord_meta::{DmChannel, NodeId};
use tracing::debug;

/// Lookup of the node hosting a channel's write-ahead log
pub trait WalLocator: Send + Sync {
    /// `None` when the registry does not know the channel
    fn wal_located(&self, channel_name: &str) -> Option<NodeId>;
}

/// In-memory WAL location registry
#[derive(Debug, Default)]
pub struct StaticWalLocator {
    locations: RwLock<HashMap<String, NodeId>>,
}

impl StaticWalLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, channel_name: impl Into<String>, node: NodeId) {
        self.locations.write().insert(channel_name.into(), node);
    }

    pub fn remove(&self, channel_name: &str) -> Option<NodeId> {
        self.locations.write().remove(channel_name)
    }
}

impl<S: Into<String>> FromIterator<(S, NodeId)> for StaticWalLocator {
    fn from_iter<I: IntoIterator<Item = (S, NodeId)>>(iter: I) -> Self {
        let locations = iter.into_iter().map(|(ch, node)| (ch.into(), node)).collect();
        Self {
            locations: RwLock::new(locations),
        }
    }
}

impl WalLocator for StaticWalLocator {
    fn wal_located(&self, channel_name: &str) -> Option<NodeId> {
        self.locations.read().get(channel_name).copied()
    }
}

/// 1 if the channel is served where its WAL lives, else 0
///
/// An unknown WAL location counts as not colocated.
pub fn colocation_weight(channel: &DmChannel, locator: &dyn WalLocator) -> u8 {
    match locator.wal_located(&channel.channel_name) {
        Some(node) if node == channel.node => 1,
        _ => 0,
    }
}

/// Stable-sort channels so colocated ones come last
///
/// Returns the input untouched when streaming is disabled.
pub fn sort_channels_by_colocation(
    mut channels: Vec<DmChannel>,
    locator: &dyn WalLocator,
    streaming_enabled: bool,
) -> Vec<DmChannel> {
    if !streaming_enabled {
        return channels;
    }

    channels.sort_by_cached_key(|ch| colocation_weight(ch, locator));
    debug!(channels = channels.len(), "Sorted channels by WAL colocation");
    channels
}

/// Colocation sort bound to a locator and the streaming flag
#[derive(Clone)]
pub struct ColocationSorter {
    locator: Arc<dyn WalLocator>,
    streaming_enabled: bool,
}

impl ColocationSorter {
    pub fn new(locator: Arc<dyn WalLocator>, streaming_enabled: bool) -> Self {
        Self {
            locator,
            streaming_enabled,
        }
    }

    pub fn streaming_enabled(&self) -> bool {
        self.streaming_enabled
    }

    pub fn sort(&self, channels: Vec<DmChannel>) -> Vec<DmChannel> {
        sort_channels_by_colocation(channels, self.locator.as_ref(), self.streaming_enabled)
    }
}

impl std::fmt::Debug for ColocationSorter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColocationSorter")
            .field("streaming_enabled", &self.streaming_enabled)
            .finish_non_exhaustive()
    }
}
