//! Error types of the topology core.

use thiserror::Error;

use crate::{
    runtime::{Rank, RuntimeError},
    topology::NodeId,
};

/// An error raised while loading, partitioning or mutating a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The description does not have the expected shape.
    #[error("malformed topology description: {0}")]
    MalformedTopology(String),

    /// A node identifier is absent from the graph.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// A node carries a pre-assigned rank that is outside of the process group.
    #[error("node {node} is pinned to rank {rank} but the world size is {world_size}")]
    RankOutOfRange {
        node: NodeId,
        rank: Rank,
        world_size: usize,
    },

    /// A partition was requested over zero ranks.
    #[error("cannot partition over a world size of {0}")]
    InvalidWorldSize(usize),

    /// A graph node is owned by zero or more than one rank.
    #[error("partition inconsistency: node {node} is owned by {owners} ranks")]
    PartitionInconsistency { node: NodeId, owners: usize },

    #[error("distributed runtime failure: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("failed to encode or decode a removal: {0}")]
    Codec(#[from] bincode::Error),

    #[error("failed to read topology description: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for TopologyError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::MalformedTopology(err.to_string())
    }
}

impl From<serde_json::Error> for TopologyError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedTopology(err.to_string())
    }
}
