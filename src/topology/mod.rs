//! Topology management.
//!
//! A topology is a directed graph of simulated nodes: federated learning servers and the
//! clients (computing devices) they talk to. Every node carries a record of simulation attributes
//! and every link the channel model it uses.
//!
//! A [`Topo`] is built from a [`TopologyDescription`], either read from a file or generated by a
//! [`RandTopo`], and sharded across the ranks of the process group: each rank simulates the
//! nodes of its own partition set. Nodes and links can be removed while the simulation runs, the
//! monitor rank deciding on the removals and [`Topo::sync_removal`] applying them on every rank.

pub mod attrs;
pub mod description;
pub mod error;
pub mod generator;
pub mod graph;
pub mod partition;
pub mod source;
pub mod topo;

pub use self::{
    attrs::{
        Adjacency,
        Edge,
        EdgeAttrs,
        NodeAttrs,
        NodeId,
        NodeKind,
        DEFAULT_ENERGY,
        DEFAULT_KIND,
        DEFAULT_MOVABLE,
        DEFAULT_POWER,
    },
    description::TopologyDescription,
    error::TopologyError,
    generator::{RandMethod, RandTopo, STAR_CHANNEL, STAR_SERVER},
    graph::Graph,
    partition::{Assignment, PartitionTable},
    source::TopologySource,
    topo::{Removal, RemovalReport, Topo, MONITOR_RANK},
};

#[cfg(test)]
mod tests;
