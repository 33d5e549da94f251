//! Sharding of topology nodes across the ranks of a process group.

use crate::{
    runtime::Rank,
    topology::{Graph, NodeId, TopologyError},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// The nodes owned by each rank. The index is the rank.
pub struct PartitionTable {
    sets: Vec<Vec<NodeId>>,
}

/// The outcome of [`PartitionTable::assign`].
#[derive(Debug)]
pub struct Assignment {
    pub table: PartitionTable,
    /// Nodes which were given a rank by enumeration order, to be written back onto the nodes.
    pub assigned: Vec<(NodeId, Rank)>,
}

impl PartitionTable {
    /// Creates a table of `world_size` empty sets.
    pub fn new(world_size: usize) -> Self {
        Self {
            sets: vec![Vec::new(); world_size],
        }
    }

    /// Assigns the nodes, given in insertion order together with their pre-existing rank, to
    /// `world_size` ranks.
    ///
    /// A pre-existing rank is kept if `honour_ranks` is set. Every other node is assigned to
    /// `index % world_size`. The result only depends on the order of the nodes, their
    /// pre-existing ranks and the world size, so that every process computes the same table.
    ///
    /// # Errors
    /// Fails if `world_size` is zero or if a kept rank is not smaller than `world_size`.
    pub fn assign<'a, I>(
        world_size: usize,
        nodes: I,
        honour_ranks: bool,
    ) -> Result<Assignment, TopologyError>
    where
        I: IntoIterator<Item = (&'a NodeId, Option<Rank>)>,
    {
        if world_size == 0 {
            return Err(TopologyError::InvalidWorldSize(world_size));
        }
        let mut table = Self::new(world_size);
        let mut assigned = Vec::new();
        for (index, (node, rank)) in nodes.into_iter().enumerate() {
            match rank {
                Some(rank) if honour_ranks => {
                    let set = table.sets.get_mut(rank).ok_or_else(|| {
                        TopologyError::RankOutOfRange {
                            node: node.clone(),
                            rank,
                            world_size,
                        }
                    })?;
                    set.push(node.clone());
                }
                _ => {
                    let rank = index % world_size;
                    table.sets[rank].push(node.clone());
                    assigned.push((node.clone(), rank));
                }
            }
        }
        Ok(Assignment { table, assigned })
    }

    pub fn world_size(&self) -> usize {
        self.sets.len()
    }

    /// The nodes owned by `rank`. Empty if the rank is outside of the table.
    pub fn on_rank(&self, rank: Rank) -> &[NodeId] {
        self.sets.get(rank).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first rank owning `node`.
    pub fn rank_of(&self, node: &str) -> Option<Rank> {
        self.sets
            .iter()
            .position(|set| set.iter().any(|owned| owned == node))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Rank, &[NodeId])> + '_ {
        self.sets.iter().map(Vec::as_slice).enumerate()
    }

    /// Drops `nodes` from the set of `rank` only. Returns how many entries were dropped.
    pub fn remove_from(&mut self, rank: Rank, nodes: &[NodeId]) -> usize {
        match self.sets.get_mut(rank) {
            Some(set) => {
                let before = set.len();
                set.retain(|node| !nodes.contains(node));
                before - set.len()
            }
            None => 0,
        }
    }

    /// Drops `nodes` from every set.
    pub fn remove_everywhere(&mut self, nodes: &[NodeId]) -> usize {
        (0..self.sets.len())
            .map(|rank| self.remove_from(rank, nodes))
            .sum()
    }

    /// Checks that every node of `graph` is owned by exactly one rank.
    ///
    /// Entries for nodes which are no longer in the graph are not reported: they are removals
    /// applied locally which have not reached this table yet.
    pub fn check(&self, graph: &Graph) -> Result<(), TopologyError> {
        for node in graph.node_ids() {
            let owners = self
                .sets
                .iter()
                .map(|set| set.iter().filter(|owned| *owned == node).count())
                .sum::<usize>();
            if owners != 1 {
                return Err(TopologyError::PartitionInconsistency {
                    node: node.clone(),
                    owners,
                });
            }
        }
        Ok(())
    }

    /// The nodes which are in the table but no longer in `graph`.
    pub fn stale(&self, graph: &Graph) -> Vec<(Rank, NodeId)> {
        self.iter()
            .flat_map(|(rank, set)| set.iter().map(move |node| (rank, node)))
            .filter(|(_, node)| !graph.contains_node(node.as_str()))
            .map(|(rank, node)| (rank, node.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::NodeAttrs;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|name| NodeId::from(*name)).collect()
    }

    #[test]
    fn test_round_robin() {
        let nodes = ids(&["c0", "c1", "c2", "c3"]);
        let Assignment { table, assigned } =
            PartitionTable::assign(2, nodes.iter().map(|node| (node, None)), true).unwrap();
        assert_eq!(table.on_rank(0), ids(&["c0", "c2"]).as_slice());
        assert_eq!(table.on_rank(1), ids(&["c1", "c3"]).as_slice());
        assert_eq!(assigned.len(), 4);
        assert_eq!(assigned[3], (NodeId::from("c3"), 1));
    }

    #[test]
    fn test_pinned_ranks() {
        let nodes = ids(&["c0", "c1", "c2"]);
        let ranks = vec![Some(1), None, Some(1)];
        let Assignment { table, assigned } =
            PartitionTable::assign(3, nodes.iter().zip(ranks.iter().copied()), true).unwrap();
        assert_eq!(table.on_rank(0), &[] as &[NodeId]);
        assert_eq!(table.on_rank(1), ids(&["c0", "c1", "c2"]).as_slice());
        assert_eq!(assigned, vec![(NodeId::from("c1"), 1)]);

        let Assignment { table, .. } =
            PartitionTable::assign(3, nodes.iter().zip(ranks.iter().copied()), false).unwrap();
        assert_eq!(table.on_rank(0), ids(&["c0"]).as_slice());
        assert_eq!(table.on_rank(2), ids(&["c2"]).as_slice());
    }

    #[test]
    fn test_invalid_assignments() {
        let nodes = ids(&["c0"]);
        assert!(matches!(
            PartitionTable::assign(0, nodes.iter().map(|node| (node, None)), true),
            Err(TopologyError::InvalidWorldSize(0))
        ));
        assert!(matches!(
            PartitionTable::assign(2, nodes.iter().map(|node| (node, Some(2))), true),
            Err(TopologyError::RankOutOfRange { rank: 2, world_size: 2, .. })
        ));
    }

    #[test]
    fn test_remove_from_one_rank_only() {
        let nodes = ids(&["c0", "c1", "c2", "c3"]);
        let mut table = PartitionTable::assign(2, nodes.iter().map(|node| (node, None)), true)
            .unwrap()
            .table;
        assert_eq!(table.remove_from(0, &ids(&["c2", "c3"])), 1);
        assert_eq!(table.on_rank(0), ids(&["c0"]).as_slice());
        assert_eq!(table.on_rank(1), ids(&["c1", "c3"]).as_slice());
        assert_eq!(table.remove_from(7, &ids(&["c1"])), 0);
        assert_eq!(table.remove_everywhere(&ids(&["c3"])), 1);
        assert_eq!(table.rank_of("c1"), Some(1));
        assert_eq!(table.rank_of("c3"), None);
    }

    #[test]
    fn test_check_and_stale() {
        let mut graph = Graph::new();
        for id in &["c0", "c1", "c2"] {
            graph.add_node((*id).into(), NodeAttrs::default());
        }
        let mut table =
            PartitionTable::assign(2, graph.node_ids().map(|node| (node, None)), true)
                .unwrap()
                .table;
        assert!(table.check(&graph).is_ok());

        graph.remove_node("c1");
        assert!(table.check(&graph).is_ok());
        assert_eq!(table.stale(&graph), vec![(1, NodeId::from("c1"))]);

        table.sets[1].push(NodeId::from("c0"));
        match table.check(&graph) {
            Err(TopologyError::PartitionInconsistency { node, owners }) => {
                assert_eq!(node, "c0");
                assert_eq!(owners, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        table.remove_everywhere(&ids(&["c0"]));
        assert!(matches!(
            table.check(&graph),
            Err(TopologyError::PartitionInconsistency { owners: 0, .. })
        ));
    }
}
