//! A directed graph with attributed nodes and links.
//!
//! The links live in a [`StableGraph`], whose node indices survive removals. Nodes are looked up
//! through an index keyed by identifier, which also keeps their insertion order across removals,
//! since the partitioning assigns ranks by enumeration order.

use indexmap::IndexMap;
use petgraph::{
    stable_graph::{NodeIndex, StableGraph},
    Directed,
    Direction,
};

use crate::topology::{EdgeAttrs, NodeAttrs, NodeId, TopologyError};

#[derive(Clone, Debug)]
struct GraphNode {
    id: NodeId,
    attrs: NodeAttrs,
}

#[derive(Clone, Debug, Default)]
/// The graph store of a topology.
pub struct Graph {
    inner: StableGraph<GraphNode, EdgeAttrs, Directed>,
    /// Node identifiers in insertion order.
    index: IndexMap<NodeId, NodeIndex>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn contains_node(&self, node: &str) -> bool {
        self.index.contains_key(node)
    }

    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        self.edge(from, to).is_some()
    }

    pub fn node(&self, node: &str) -> Option<&NodeAttrs> {
        let ix = *self.index.get(node)?;
        self.inner.node_weight(ix).map(|node| &node.attrs)
    }

    pub fn node_mut(&mut self, node: &str) -> Option<&mut NodeAttrs> {
        let ix = *self.index.get(node)?;
        self.inner.node_weight_mut(ix).map(|node| &mut node.attrs)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&EdgeAttrs> {
        let edge = self
            .inner
            .find_edge(*self.index.get(from)?, *self.index.get(to)?)?;
        self.inner.edge_weight(edge)
    }

    /// Iterates over the nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &NodeAttrs)> + '_ {
        self.index
            .iter()
            .map(move |(id, ix)| (id, &self.inner[*ix].attrs))
    }

    /// Iterates over the nodes in index order, which is the insertion order unless nodes were
    /// added after a removal.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = (&NodeId, &mut NodeAttrs)> + '_ {
        self.inner.node_weights_mut().map(|node| {
            let GraphNode { id, attrs } = node;
            (&*id, attrs)
        })
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> + '_ {
        self.index.keys()
    }

    /// Iterates over the links, grouped by their source node in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId, &EdgeAttrs)> + '_ {
        self.index.keys().flat_map(move |from| {
            self.out_links(from.as_str()).filter_map(move |to| {
                self.edge(from.as_str(), to.as_str())
                    .map(|attrs| (from, to, attrs))
            })
        })
    }

    /// Adds a node. The attributes of an already existing node are replaced.
    pub fn add_node(&mut self, node: NodeId, attrs: NodeAttrs) {
        match self.index.get(&node) {
            Some(ix) => self.inner[*ix].attrs = attrs,
            None => {
                let ix = self.inner.add_node(GraphNode {
                    id: node.clone(),
                    attrs,
                });
                self.index.insert(node, ix);
            }
        }
    }

    /// Adds a directed link. The attributes of an already existing link are replaced.
    ///
    /// # Errors
    /// Fails if one of the endpoints is not a node of the graph.
    pub fn add_edge(&mut self, from: &str, to: &str, attrs: EdgeAttrs) -> Result<(), TopologyError> {
        let to = self.known(to)?;
        let from = self.known(from)?;
        self.inner.update_edge(from, to, attrs);
        Ok(())
    }

    /// Removes a node together with all the links starting or ending at it.
    pub fn remove_node(&mut self, node: &str) -> Option<NodeAttrs> {
        let ix = self.index.shift_remove(node)?;
        self.inner.remove_node(ix).map(|node| node.attrs)
    }

    /// Removes a directed link.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> Option<EdgeAttrs> {
        let edge = self
            .inner
            .find_edge(*self.index.get(from)?, *self.index.get(to)?)?;
        self.inner.remove_edge(edge)
    }

    /// The nodes with a link towards `node`, in insertion order.
    pub fn in_links(&self, node: &str) -> impl Iterator<Item = &NodeId> + '_ {
        self.neighbors(node, Direction::Incoming).into_iter()
    }

    /// The nodes `node` has a link towards, in insertion order.
    pub fn out_links(&self, node: &str) -> impl Iterator<Item = &NodeId> + '_ {
        self.neighbors(node, Direction::Outgoing).into_iter()
    }

    /// Every node mapped to its predecessors.
    pub fn in_graph(&self) -> IndexMap<NodeId, Vec<NodeId>> {
        self.index
            .keys()
            .map(|node| (node.clone(), self.in_links(node.as_str()).cloned().collect()))
            .collect()
    }

    /// Every node mapped to its successors.
    pub fn out_graph(&self) -> IndexMap<NodeId, Vec<NodeId>> {
        self.index
            .keys()
            .map(|node| (node.clone(), self.out_links(node.as_str()).cloned().collect()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.index.clear();
    }

    fn known(&self, node: &str) -> Result<NodeIndex, TopologyError> {
        self.index
            .get(node)
            .copied()
            .ok_or_else(|| TopologyError::UnknownNode(node.into()))
    }

    /// The neighbors of `node` in one direction, sorted by node insertion order so that every
    /// rank lists them the same way.
    fn neighbors(&self, node: &str, direction: Direction) -> Vec<&NodeId> {
        let ix = match self.index.get(node) {
            Some(ix) => *ix,
            None => return Vec::new(),
        };
        let mut neighbors: Vec<(usize, &NodeId)> = self
            .inner
            .neighbors_directed(ix, direction)
            .filter_map(|neighbor| {
                self.index
                    .get_full(&self.inner[neighbor].id)
                    .map(|(position, id, _)| (position, id))
            })
            .collect();
        neighbors.sort_unstable_by_key(|(position, _)| *position);
        neighbors.dedup_by_key(|(position, _)| *position);
        neighbors.into_iter().map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Graph {
        let mut graph = Graph::new();
        for id in &["a", "b", "c"] {
            graph.add_node((*id).into(), NodeAttrs::default());
        }
        graph.add_edge("a", "b", EdgeAttrs::with_channel("Gaussian")).unwrap();
        graph.add_edge("b", "c", EdgeAttrs::default()).unwrap();
        graph.add_edge("c", "a", EdgeAttrs::default()).unwrap();
        graph.add_edge("a", "c", EdgeAttrs::default()).unwrap();
        graph
    }

    #[test]
    fn test_links() {
        let graph = triangle();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.out_links("a").collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(graph.in_links("a").collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(graph.in_links("c").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(
            graph.edge("a", "b").and_then(|e| e.channel.as_deref()),
            Some("Gaussian")
        );
        assert!(!graph.contains_edge("b", "a"));
        assert_eq!(graph.in_links("z").count(), 0);
    }

    #[test]
    fn test_add_edge_twice_replaces_attributes() {
        let mut graph = triangle();
        graph.add_edge("b", "c", EdgeAttrs::with_channel("Rayleigh")).unwrap();
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(
            graph.edge("b", "c").and_then(|e| e.channel.as_deref()),
            Some("Rayleigh")
        );
    }

    #[test]
    fn test_add_edge_to_unknown_node() {
        let mut graph = triangle();
        match graph.add_edge("a", "z", EdgeAttrs::default()) {
            Err(TopologyError::UnknownNode(node)) => assert_eq!(node, "z"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_add_node_twice_keeps_position() {
        let mut graph = triangle();
        graph.add_node("a".into(), NodeAttrs::server());
        assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(graph.node("a").unwrap().is_server());
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_remove_node_drops_incident_links() {
        let mut graph = triangle();
        assert!(graph.remove_node("a").is_some());
        assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.contains_edge("b", "c"));
        assert_eq!(graph.in_links("c").collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(graph.out_links("c").count(), 0);
        assert!(graph.remove_node("a").is_none());
    }

    #[test]
    fn test_remove_edge() {
        let mut graph = triangle();
        assert!(graph.remove_edge("a", "b").is_some());
        assert!(graph.remove_edge("a", "b").is_none());
        assert!(graph.remove_edge("z", "b").is_none());
        assert_eq!(graph.in_links("b").count(), 0);
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_self_loop() {
        let mut graph = triangle();
        graph.add_edge("b", "b", EdgeAttrs::default()).unwrap();
        assert_eq!(graph.out_links("b").collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(graph.in_links("b").collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(graph.remove_node("b").is_some());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_in_and_out_graph() {
        let graph = triangle();
        let out = graph.out_graph();
        let inc = graph.in_graph();
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(out["a"], vec![NodeId::from("b"), NodeId::from("c")]);
        assert_eq!(inc["b"], vec![NodeId::from("a")]);
        assert_eq!(inc["c"], vec![NodeId::from("a"), NodeId::from("b")]);
        let total: usize = inc.values().map(Vec::len).sum();
        assert_eq!(total, graph.edge_count());
        assert_eq!(graph.edges().count(), graph.edge_count());
    }

    #[test]
    fn test_in_and_out_graph_after_removal() {
        let mut graph = triangle();
        graph.remove_node("b");
        graph.add_node("d".into(), NodeAttrs::default());
        graph.add_edge("d", "a", EdgeAttrs::default()).unwrap();

        let out = graph.out_graph();
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["a", "c", "d"]);
        assert_eq!(out["a"], vec![NodeId::from("c")]);
        assert_eq!(graph.in_graph()["a"], vec![NodeId::from("c"), NodeId::from("d")]);
        assert_eq!(graph.edges().count(), 3);
    }

    #[test]
    fn test_insertion_order_survives_removal() {
        let mut graph = Graph::new();
        for id in &["c3", "c1", "c2", "c0"] {
            graph.add_node((*id).into(), NodeAttrs::default());
        }
        graph.remove_node("c1");
        assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec!["c3", "c2", "c0"]);
        let attrs: Vec<_> = graph.nodes().map(|(id, _)| id.as_str()).collect();
        assert_eq!(attrs, vec!["c3", "c2", "c0"]);
    }
}
