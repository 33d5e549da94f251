//! Topology test utilities.

mod multi_rank;

use crate::{
    model::ParameterList,
    topology::{NodeAttrs, NodeId, RandMethod, RandTopo, TopologyDescription},
};

/// A small convolutional model of 1.179968M counted parameters.
pub fn model() -> ParameterList {
    vec![
        ("conv1.weight", 288),
        ("conv1.bias", 32),
        ("fc1.weight", 1_179_648),
        ("aux_classifier.weight", 4_096),
    ]
    .into_iter()
    .collect()
}

/// One server `c0` and one client `c1` linked to it.
pub fn server_and_client() -> TopologyDescription {
    TopologyDescription::from_yaml_str(
        r#"
c0:
  type: server
  adj: {}
c1:
  type: client
  adj:
    c0:
      channel: Gaussian
"#,
    )
    .unwrap()
}

/// A generated star of one server and `n_clients` clients.
pub fn star(n_clients: usize) -> TopologyDescription {
    RandTopo::new(RandMethod::Static { n_clients }).description()
}

/// `n` unlinked clients named `n0..n{n-1}`.
pub fn unlinked(n: usize) -> TopologyDescription {
    (0..n)
        .map(|i| (NodeId::new(format!("n{}", i)), NodeAttrs::client()))
        .collect()
}

pub fn ids(names: &[&str]) -> Vec<NodeId> {
    names.iter().map(|name| NodeId::from(*name)).collect()
}
