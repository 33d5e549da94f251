//! The topology lifecycle: loading, partitioning, pruning and querying.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    model::{self, Model},
    runtime::{Rank, Runtime},
    topology::{
        Edge,
        EdgeAttrs,
        Graph,
        NodeAttrs,
        NodeId,
        PartitionTable,
        RandTopo,
        TopologyDescription,
        TopologyError,
        TopologySource,
    },
};

/// The rank which decides on topology changes and broadcasts them to the other ranks.
pub const MONITOR_RANK: Rank = 0;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Nodes and directed links to remove from a topology.
pub struct Removal {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<Edge>,
}

impl Removal {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// The outcome of [`Topo::remove`].
pub struct RemovalReport {
    pub removed_nodes: usize,
    pub removed_edges: usize,
    /// Requested nodes which were not in the graph.
    pub unknown_nodes: Vec<NodeId>,
    /// Requested links which were not in the graph, leaving out the links of removed nodes.
    pub unknown_edges: Vec<Edge>,
}

impl RemovalReport {
    /// Whether every requested node and link was found.
    pub fn is_clean(&self) -> bool {
        self.unknown_nodes.is_empty() && self.unknown_edges.is_empty()
    }
}

/// A topology of simulated nodes, sharded across the ranks of a process group.
///
/// The topology owns its graph and its partition table. Both are only mutated through
/// [`Topo::load_from_dict`], [`Topo::partition`] and [`Topo::remove`], which keep them consistent.
pub struct Topo<'a> {
    graph: Graph,
    partitioned: PartitionTable,
    model: &'a dyn Model,
    runtime: &'a dyn Runtime,
}

impl<'a> fmt::Debug for Topo<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topo")
            .field("graph", &self.graph)
            .field("partitioned", &self.partitioned)
            .finish()
    }
}

impl<'a> Topo<'a> {
    /// Creates an empty topology bound to a model and a runtime.
    pub fn new(model: &'a dyn Model, runtime: &'a dyn Runtime) -> Self {
        Self {
            graph: Graph::new(),
            partitioned: PartitionTable::default(),
            model,
            runtime,
        }
    }

    /// Creates a topology and loads the description produced by `source`.
    pub fn from_source(
        model: &'a dyn Model,
        runtime: &'a dyn Runtime,
        source: &TopologySource,
    ) -> Result<Self, TopologyError> {
        let mut topo = Self::new(model, runtime);
        topo.load_from_dict(source.describe()?)?;
        Ok(topo)
    }

    /// Creates a topology and loads the description produced by `generator`.
    pub fn from_generator(
        model: &'a dyn Model,
        runtime: &'a dyn Runtime,
        generator: RandTopo,
    ) -> Result<Self, TopologyError> {
        let mut topo = Self::new(model, runtime);
        topo.load_from_dict(generator.description())?;
        Ok(topo)
    }

    /// Loads a description, replacing the current graph.
    ///
    /// Every key of the description becomes a node. Every `adj` entry becomes a directed link,
    /// and is also kept on the node. The nodes are then partitioned and the missing attributes
    /// defaulted.
    ///
    /// # Errors
    /// Fails if a link points to an undeclared node or if a pinned rank is out of the process
    /// group. The topology is left untouched in that case.
    pub fn load_from_dict(&mut self, description: TopologyDescription) -> Result<(), TopologyError> {
        description.validate()?;

        let links: Vec<(NodeId, NodeId, EdgeAttrs)> = description
            .iter()
            .flat_map(|(from, attrs)| {
                attrs
                    .adj
                    .iter()
                    .flatten()
                    .map(move |(to, edge)| (from.clone(), to.clone(), edge.clone()))
            })
            .collect();
        let mut graph = Graph::new();
        for (node, attrs) in description {
            graph.add_node(node, attrs);
        }
        for (from, to, attrs) in links {
            graph.add_edge(from.as_str(), to.as_str(), attrs)?;
        }

        let partitioned = self.partition_graph(&mut graph, None)?;
        self.graph = graph;
        self.partitioned = partitioned;
        self.defaults();

        info!(
            "loaded topology of {} nodes and {} links over {} ranks",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.partitioned.world_size()
        );
        Ok(())
    }

    /// Gives every node the default value of the attributes it lacks. Present attributes are
    /// never overwritten.
    pub fn defaults(&mut self) {
        for (_, attrs) in self.graph.nodes_mut() {
            attrs.fill_defaults();
        }
    }

    /// Partitions the nodes over `world_size` ranks.
    ///
    /// Without `world_size`, the world size of the runtime is used if a distributed session is
    /// active, else `1`. Nodes are enumerated in insertion order. A node keeps its `rank`
    /// attribute if a session is active, otherwise it is assigned to `index % world_size` and the
    /// assignment is written back onto its `rank` attribute.
    ///
    /// # Errors
    /// Fails if the world size is zero or if a kept rank is out of range. The topology is left
    /// untouched in that case.
    pub fn partition(&mut self, world_size: Option<usize>) -> Result<(), TopologyError> {
        let mut graph = std::mem::take(&mut self.graph);
        let partitioned = self.partition_graph(&mut graph, world_size);
        self.graph = graph;
        self.partitioned = partitioned?;
        Ok(())
    }

    fn partition_graph(
        &self,
        graph: &mut Graph,
        world_size: Option<usize>,
    ) -> Result<PartitionTable, TopologyError> {
        let session = self.runtime.is_initialized();
        let world_size = world_size.unwrap_or(if session {
            self.runtime.world_size()
        } else {
            1
        });

        let assignment = PartitionTable::assign(
            world_size,
            graph.nodes().map(|(node, attrs)| (node, attrs.rank)),
            session,
        )?;
        for (node, rank) in assignment.assigned {
            if let Some(attrs) = graph.node_mut(node.as_str()) {
                attrs.rank = Some(rank);
            }
        }
        for (rank, nodes) in assignment.table.iter() {
            debug!("rank {} owns {} nodes", rank, nodes.len());
        }
        Ok(assignment.table)
    }

    /// Removes nodes and directed links.
    ///
    /// The links of removed nodes go with them, and the `adj` entries pointing to removed nodes
    /// or links are pruned. The removed nodes are dropped from the partition set of the local
    /// rank only: the other sets are updated when the same removal is applied on their ranks,
    /// see [`Topo::sync_removal`].
    ///
    /// Unknown nodes and links are skipped and listed in the report.
    pub fn remove(&mut self, nodes: &[NodeId], edges: &[Edge]) -> RemovalReport {
        let mut report = RemovalReport::default();

        for node in nodes {
            if self.graph.remove_node(node.as_str()).is_some() {
                report.removed_nodes += 1;
            } else {
                warn!("cannot remove node {}: not found", node);
                report.unknown_nodes.push(node.clone());
            }
        }
        for (from, to) in edges {
            if self.graph.remove_edge(from.as_str(), to.as_str()).is_some() {
                report.removed_edges += 1;
            } else if !nodes.contains(from) && !nodes.contains(to) {
                warn!("cannot remove link {} -> {}: not found", from, to);
                report.unknown_edges.push((from.clone(), to.clone()));
            }
        }
        self.remove_adj_from(nodes, edges);

        let rank = self.rank();
        let dropped = self.partitioned.remove_from(rank, nodes);
        debug!(
            "removed {} nodes and {} links, {} of them from rank {}",
            report.removed_nodes, report.removed_edges, dropped, rank
        );
        report
    }

    /// Prunes the `adj` attributes: entries towards one of `nodes` and entries matching one of
    /// `edges` are dropped.
    ///
    /// [`Topo::remove`] calls this after mutating the graph. Calling it on its own leaves the
    /// graph links in place.
    pub fn remove_adj_from(&mut self, nodes: &[NodeId], edges: &[Edge]) {
        for (_, attrs) in self.graph.nodes_mut() {
            if let Some(adj) = attrs.adj.as_mut() {
                adj.retain(|neighbor, _| !nodes.contains(neighbor));
            }
        }
        for (from, to) in edges {
            if let Some(adj) = self
                .graph
                .node_mut(from.as_str())
                .and_then(|attrs| attrs.adj.as_mut())
            {
                adj.shift_remove(to.as_str());
            }
        }
    }

    /// Applies the removal decided by the monitor rank on every rank.
    ///
    /// Every rank of the group must call this collectively. The `removal` of the monitor rank is
    /// broadcast, the argument of the other ranks is ignored. Each rank applies the broadcast
    /// removal and drops the removed nodes from all the partition sets, so that the tables of all
    /// ranks agree afterwards.
    pub fn sync_removal(
        &mut self,
        removal: Option<&Removal>,
    ) -> Result<(Removal, RemovalReport), TopologyError> {
        let rank = self.rank();
        let payload = if rank == self.monitor_rank() {
            let empty = Removal::default();
            bincode::serialize(removal.unwrap_or(&empty))?
        } else {
            if removal.is_some() {
                debug!("rank {} is not the monitor, ignoring its removal", rank);
            }
            Vec::new()
        };

        let payload = self.runtime.broadcast(payload, self.monitor_rank())?;
        let removal: Removal = bincode::deserialize(&payload)?;
        let report = self.remove(&removal.nodes, &removal.edges);
        self.partitioned.remove_everywhere(&removal.nodes);
        info!(
            "rank {} applied removal of {} nodes and {} links",
            rank,
            removal.nodes.len(),
            removal.edges.len()
        );
        Ok((removal, report))
    }

    /// Checks that every node is owned by exactly one rank.
    pub fn check_partition(&self) -> Result<(), TopologyError> {
        self.partitioned.check(&self.graph)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The nodes owned by each rank. The index is the rank.
    pub fn partitioned(&self) -> &PartitionTable {
        &self.partitioned
    }

    pub fn node(&self, node: &str) -> Option<&NodeAttrs> {
        self.graph.node(node)
    }

    pub fn in_links(&self, node: &str) -> impl Iterator<Item = &NodeId> + '_ {
        self.graph.in_links(node)
    }

    pub fn out_links(&self, node: &str) -> impl Iterator<Item = &NodeId> + '_ {
        self.graph.out_links(node)
    }

    pub fn in_graph(&self) -> IndexMap<NodeId, Vec<NodeId>> {
        self.graph.in_graph()
    }

    pub fn out_graph(&self) -> IndexMap<NodeId, Vec<NodeId>> {
        self.graph.out_graph()
    }

    /// The federated learning servers.
    pub fn servers(&self) -> Vec<&NodeId> {
        self.graph
            .nodes()
            .filter(|(_, attrs)| attrs.is_server())
            .map(|(node, _)| node)
            .collect()
    }

    /// The computing devices.
    pub fn clients(&self) -> Vec<&NodeId> {
        self.graph
            .nodes()
            .filter(|(_, attrs)| attrs.is_client())
            .map(|(node, _)| node)
            .collect()
    }

    /// The rank of the current process, `0` without distributed session.
    pub fn rank(&self) -> Rank {
        if self.runtime.is_initialized() {
            self.runtime.rank()
        } else {
            0
        }
    }

    pub fn monitor_rank(&self) -> Rank {
        MONITOR_RANK
    }

    /// The nodes owned by the current process.
    pub fn nodes_on_device(&self) -> &[NodeId] {
        self.partitioned.on_rank(self.rank())
    }

    pub fn clients_on_device(&self) -> Vec<&NodeId> {
        self.on_device(NodeAttrs::is_client)
    }

    pub fn servers_on_device(&self) -> Vec<&NodeId> {
        self.on_device(NodeAttrs::is_server)
    }

    fn on_device(&self, filter: fn(&NodeAttrs) -> bool) -> Vec<&NodeId> {
        self.nodes_on_device()
            .iter()
            .filter(|node| self.graph.node(node.as_str()).map_or(false, filter))
            .collect()
    }

    /// The size of the bound model in millions of parameter elements.
    pub fn model_size(&self) -> f64 {
        model::model_size(self.model)
    }

    /// A human readable dump of the nodes, their links and the partition as seen by this rank.
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        report.push_str(&format!(
            "rank: {} (monitor: {}), model size: {:.6}M\npartition:\n",
            self.rank(),
            self.monitor_rank(),
            self.model_size()
        ));
        for (rank, nodes) in self.partitioned.iter() {
            let nodes: Vec<&str> = nodes.iter().map(NodeId::as_str).collect();
            report.push_str(&format!("  --rank {}: [{}]\n", rank, nodes.join(", ")));
        }
        for (rank, node) in self.partitioned.stale(&self.graph) {
            report.push_str(&format!("  --pending removal on rank {}: {}\n", rank, node));
        }
        report
    }
}

impl<'a> fmt::Display for Topo<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "node:")?;
        for (node, attrs) in self.graph.nodes() {
            writeln!(f, "  --name: {}, --attrs: {}", node, DisplayAttrs(attrs))?;
            write!(f, "  --adjacency: {{")?;
            for (i, to) in self.graph.out_links(node.as_str()).enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                let channel = self
                    .graph
                    .edge(node.as_str(), to.as_str())
                    .and_then(|edge| edge.channel.as_deref());
                match channel {
                    Some(channel) => write!(f, "{}: {{channel: {}}}", to, channel)?,
                    None => write!(f, "{}: {{}}", to)?,
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

struct DisplayAttrs<'n>(&'n NodeAttrs);

impl<'n> fmt::Display for DisplayAttrs<'n> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs = self.0;
        write!(
            f,
            "{{type: {}, send_P: {}, recv_P: {}, cal_P: {}, energy: {}, movable: {}",
            attrs.kind(),
            attrs.send_p(),
            attrs.recv_p(),
            attrs.cal_p(),
            attrs.energy(),
            attrs.movable()
        )?;
        if let Some(rank) = attrs.rank {
            write!(f, ", rank: {}", rank)?;
        }
        for (key, value) in &attrs.extra {
            write!(f, ", {}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}
