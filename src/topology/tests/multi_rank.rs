use std::thread;

use super::{ids, model, star};
use crate::{
    runtime::{LocalGroup, LocalRank, Runtime},
    topology::{NodeId, PartitionTable, Removal, Topo, TopologyError},
};

/// What a rank ends up with after running `simulate`.
#[derive(Debug)]
struct Outcome {
    rank: usize,
    table: PartitionTable,
    nodes: Vec<NodeId>,
    on_device: Vec<NodeId>,
}

/// Runs `simulate` on every rank of a group of `world_size`, each rank on its own thread.
fn run_group<F>(world_size: usize, simulate: F) -> Vec<Outcome>
where
    F: Fn(&mut Topo<'_>) -> Result<(), TopologyError> + Send + Sync + Copy + 'static,
{
    let handles: Vec<_> = LocalGroup::new(world_size)
        .into_ranks()
        .into_iter()
        .map(|runtime: LocalRank| {
            thread::spawn(move || {
                let model = model();
                let mut topo = Topo::new(&model, &runtime);
                topo.load_from_dict(star(5)).unwrap();
                simulate(&mut topo).unwrap();
                topo.check_partition().unwrap();
                Outcome {
                    rank: runtime.rank(),
                    table: topo.partitioned().clone(),
                    nodes: topo.graph().node_ids().cloned().collect(),
                    on_device: topo.nodes_on_device().to_vec(),
                }
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}

#[test]
fn test_ranks_compute_the_same_partition() {
    let outcomes = run_group(3, |_| Ok(()));
    for outcome in &outcomes {
        assert_eq!(outcome.table, outcomes[0].table);
        assert_eq!(outcome.table.world_size(), 3);
        assert_eq!(outcome.on_device, outcome.table.on_rank(outcome.rank));
    }
    assert_eq!(outcomes[0].on_device, ids(&["c0", "c3"]));
    assert_eq!(outcomes[1].on_device, ids(&["c1", "c4"]));
    assert_eq!(outcomes[2].on_device, ids(&["c2", "c5"]));
}

#[test]
fn test_sync_removal_converges() {
    let outcomes = run_group(3, |topo| {
        let removal = Removal {
            nodes: ids(&["c3", "c4"]),
            edges: vec![(NodeId::from("c1"), NodeId::from("c0"))],
        };
        let proposal = if topo.rank() == topo.monitor_rank() {
            Some(&removal)
        } else {
            None
        };
        let (applied, report) = topo.sync_removal(proposal)?;
        assert_eq!(applied, removal);
        assert!(report.is_clean());
        assert!(!topo.graph().contains_edge("c1", "c0"));
        Ok(())
    });

    for outcome in &outcomes {
        assert_eq!(outcome.table, outcomes[0].table);
        assert_eq!(outcome.nodes, ids(&["c0", "c1", "c2", "c5"]));
        assert_eq!(outcome.table.rank_of("c3"), None);
        assert_eq!(outcome.table.rank_of("c4"), None);
    }
    assert_eq!(outcomes[0].on_device, ids(&["c0"]));
    assert_eq!(outcomes[1].on_device, ids(&["c1"]));
    assert_eq!(outcomes[2].on_device, ids(&["c2", "c5"]));
}

#[test]
fn test_proposals_of_other_ranks_are_ignored() {
    let outcomes = run_group(2, |topo| {
        let proposal = Removal {
            nodes: ids(&["c1"]),
            edges: vec![],
        };
        let proposal = if topo.rank() == topo.monitor_rank() {
            None
        } else {
            Some(&proposal)
        };
        let (applied, _) = topo.sync_removal(proposal)?;
        assert!(applied.is_empty());
        Ok(())
    });
    for outcome in &outcomes {
        assert_eq!(outcome.nodes.len(), 6);
        assert_eq!(outcome.table.rank_of("c1"), Some(1));
    }
}

#[test]
fn test_local_removal_only_updates_the_local_set() {
    let ranks = LocalGroup::new(2).into_ranks();
    let model = model();
    let mut monitor = Topo::new(&model, &ranks[0]);
    let mut other = Topo::new(&model, &ranks[1]);
    monitor.load_from_dict(star(3)).unwrap();
    other.load_from_dict(star(3)).unwrap();

    let c2 = NodeId::from("c2");
    monitor.remove(&[c2.clone()], &[(NodeId::from("c0"), c2)]);
    assert_eq!(monitor.partitioned().on_rank(0), ids(&["c0"]).as_slice());
    assert_eq!(monitor.partitioned().on_rank(1), ids(&["c1", "c3"]).as_slice());
    assert_eq!(other.partitioned().on_rank(0), ids(&["c0", "c2"]).as_slice());

    // a node removed on a rank which does not own it stays in the owner's set until synced
    other.remove(&ids(&["c3"]), &[]);
    assert_eq!(other.partitioned().on_rank(1), ids(&["c1"]).as_slice());
    monitor.remove(&ids(&["c3"]), &[]);
    assert_eq!(monitor.partitioned().stale(monitor.graph()), vec![(1, NodeId::from("c3"))]);
    assert!(monitor.check_partition().is_ok());
    assert!(monitor.report().contains("--pending removal on rank 1: c3"));
}
