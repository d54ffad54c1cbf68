//! Cluster topology discovered from `CLUSTER SLOTS`.

use std::collections::HashMap;

use crate::core::{Error, Result};
use crate::proto::frame::Frame;

use super::slot::SLOT_COUNT;

/// Unique identifier for a Redis node in the cluster.
///
/// Node IDs are 40-character hex strings assigned by Redis; when a server
/// omits them the `host:port` address is used instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new NodeId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the node ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node serving a slot range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Node ID
    pub id: NodeId,
    /// Network address (`host:port`)
    pub address: String,
}

/// A range of hash slots assigned to a master and its replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    /// Start of the slot range (inclusive)
    pub start: u16,
    /// End of the slot range (inclusive)
    pub end: u16,
    /// Master node serving this slot range
    pub master: NodeInfo,
    /// Replica nodes for this slot range
    pub replicas: Vec<NodeInfo>,
}

impl SlotRange {
    /// Returns true if the given slot is within this range.
    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    /// Returns the number of slots in this range.
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// Always false: ranges are validated on parse.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Slot map of the whole cluster.
#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
    /// Slot ranges with their master and replica nodes
    pub slot_ranges: Vec<SlotRange>,
    /// All nodes in the cluster, indexed by node ID
    pub nodes: HashMap<NodeId, NodeInfo>,
}

impl ClusterTopology {
    /// Creates a new empty cluster topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the range covering `slot`.
    pub fn range_for_slot(&self, slot: u16) -> Option<&SlotRange> {
        self.slot_ranges.iter().find(|range| range.contains(slot))
    }

    /// Finds the master node responsible for a given slot.
    pub fn get_master_for_slot(&self, slot: u16) -> Option<&NodeInfo> {
        self.range_for_slot(slot).map(|range| &range.master)
    }

    /// Finds all replica nodes for a given slot.
    pub fn get_replicas_for_slot(&self, slot: u16) -> Option<&[NodeInfo]> {
        self.range_for_slot(slot).map(|range| range.replicas.as_slice())
    }

    /// Addresses of every master, without duplicates, in slot order.
    pub fn master_addresses(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for range in &self.slot_ranges {
            if !seen.contains(&range.master.address) {
                seen.push(range.master.address.clone());
            }
        }
        seen
    }

    /// Checks if all 16384 slots are served.
    pub fn is_fully_covered(&self) -> bool {
        let mut ranges: Vec<(u16, u16)> = self
            .slot_ranges
            .iter()
            .map(|range| (range.start, range.end))
            .collect();
        ranges.sort_unstable();

        let mut next: u32 = 0;
        for (start, end) in ranges {
            if u32::from(start) > next {
                return false;
            }
            next = next.max(u32::from(end) + 1);
        }
        next >= u32::from(SLOT_COUNT)
    }

    /// Parses a `CLUSTER SLOTS` reply.
    ///
    /// `fallback_host` replaces the empty IP a node reports when it does not
    /// know its own address; pass the host of the node that was queried.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not an array, a slot range is out of
    /// bounds or a master entry is malformed.
    pub fn from_cluster_slots(frame: Frame, fallback_host: &str) -> Result<Self> {
        let mut topology = Self::new();

        let ranges = match frame {
            Frame::Array(arr) => arr,
            Frame::Error(e) => {
                return Err(Error::Server {
                    message: String::from_utf8_lossy(&e).into_owned(),
                })
            }
            _ => return Err(Error::protocol("CLUSTER SLOTS response must be an array")),
        };

        for range_frame in ranges {
            let range_arr = match range_frame {
                Frame::Array(arr) if arr.len() >= 3 => arr,
                _ => continue,
            };

            let (start, end) = match (&range_arr[0], &range_arr[1]) {
                (Frame::Integer(start), Frame::Integer(end)) => (*start, *end),
                _ => continue,
            };
            if start < 0 || end < start || end >= i64::from(SLOT_COUNT) {
                return Err(Error::protocol(format!(
                    "invalid slot range {}-{}",
                    start, end
                )));
            }

            let master = parse_node(&range_arr[2], fallback_host)?;
            let replicas: Vec<NodeInfo> = range_arr
                .iter()
                .skip(3)
                .filter_map(|node| parse_node(node, fallback_host).ok())
                .collect();

            topology.nodes.insert(master.id.clone(), master.clone());
            for replica in &replicas {
                topology.nodes.insert(replica.id.clone(), replica.clone());
            }
            topology.slot_ranges.push(SlotRange {
                start: start as u16,
                end: end as u16,
                master,
                replicas,
            });
        }

        Ok(topology)
    }
}

/// Parses a `[ip, port, id?, ...]` node entry.
fn parse_node(frame: &Frame, fallback_host: &str) -> Result<NodeInfo> {
    let node_arr = match frame {
        Frame::Array(arr) if arr.len() >= 2 => arr,
        _ => return Err(Error::protocol("Node info must be an array of at least 2 elements")),
    };

    let ip = match &node_arr[0] {
        Frame::BulkString(Some(data)) => String::from_utf8_lossy(data).into_owned(),
        Frame::BulkString(None) | Frame::Null => String::new(),
        _ => return Err(Error::protocol("Node IP must be a bulk string")),
    };
    let ip = if ip.is_empty() { fallback_host.to_string() } else { ip };

    let port = match &node_arr[1] {
        Frame::Integer(n) => *n,
        _ => return Err(Error::protocol("Node port must be an integer")),
    };

    let address = format!("{}:{}", ip, port);
    let id = match node_arr.get(2) {
        Some(Frame::BulkString(Some(data))) if !data.is_empty() => {
            NodeId::new(String::from_utf8_lossy(data).into_owned())
        }
        _ => NodeId::new(address.clone()),
    };

    Ok(NodeInfo { id, address })
}
