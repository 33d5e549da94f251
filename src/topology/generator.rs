//! Procedurally generated topologies.

use std::{fmt, str::FromStr};

use crate::topology::{EdgeAttrs, NodeAttrs, NodeId, TopologyDescription, TopologyError};

/// The identifier of the server of a generated star.
pub const STAR_SERVER: &str = "c0";
/// The channel model of the links of a generated star.
pub const STAR_CHANNEL: &str = "Gaussian";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// A generation method together with its parameters.
pub enum RandMethod {
    /// One server `c0` linked both ways to the clients `c1..=cn`.
    Static { n_clients: usize },
}

impl fmt::Display for RandMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RandMethod::Static { n_clients } => write!(f, "static:{}", n_clients),
        }
    }
}

impl FromStr for RandMethod {
    type Err = TopologyError;

    /// Parses `<method>:<parameters>`, e.g. `static:5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TopologyError::MalformedTopology(format!("invalid generator: {}", s));
        let (method, params) = s.split_once(':').ok_or_else(malformed)?;
        match method.trim() {
            "static" => {
                let n_clients = params.trim().parse().map_err(|_| malformed())?;
                Ok(RandMethod::Static { n_clients })
            }
            _ => Err(malformed()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// A generator of topology descriptions.
///
/// The generated description is a pure function of the method, so that every rank can generate
/// the same topology on its own instead of receiving it.
pub struct RandTopo {
    method: RandMethod,
}

impl RandTopo {
    pub fn new(method: RandMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> RandMethod {
        self.method
    }

    pub fn description(&self) -> TopologyDescription {
        match self.method {
            RandMethod::Static { n_clients } => static_star(n_clients),
        }
    }
}

fn static_star(n_clients: usize) -> TopologyDescription {
    let clients: Vec<NodeId> = (1..=n_clients)
        .map(|i| NodeId::new(format!("c{}", i)))
        .collect();

    let mut server = NodeAttrs {
        energy: Some(f64::INFINITY),
        movable: Some(false),
        ..NodeAttrs::server()
    };
    for client in &clients {
        server.link_to(client.clone(), EdgeAttrs::with_channel(STAR_CHANNEL));
    }
    // the server carries an adjacency even without clients
    server.adj.get_or_insert_with(Default::default);

    let mut description = TopologyDescription::new();
    description.insert(STAR_SERVER, server);
    for client in clients {
        let mut attrs = NodeAttrs::client();
        attrs.link_to(STAR_SERVER, EdgeAttrs::with_channel(STAR_CHANNEL));
        description.insert(client, attrs);
    }
    description
}
