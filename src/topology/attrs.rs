//! Typed node and edge records.
//!
//! The keys the core reasons about are typed fields. Any other key found in a description is kept
//! verbatim in the `extra` map of the record so that it survives a load/serialize cycle.

use std::{borrow::Borrow, collections::BTreeMap, fmt};

use derive_more::{Display, From};
use indexmap::IndexMap;
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
    Serialize,
};

use crate::runtime::Rank;

/// The default transmit, receive and compute power of a node.
pub const DEFAULT_POWER: f64 = 1e-4;
/// The default energy budget of a node.
pub const DEFAULT_ENERGY: f64 = 30.0;
/// Nodes are static unless told otherwise.
pub const DEFAULT_MOVABLE: bool = false;
/// Nodes are clients unless told otherwise.
pub const DEFAULT_KIND: NodeKind = NodeKind::Client;

#[derive(Clone, Debug, Display, Eq, From, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
/// The identifier of a simulated node.
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl PartialEq<str> for NodeId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A directed link, from the first node to the second one.
pub type Edge = (NodeId, NodeId);

/// The neighbors of a node together with the attributes of the links towards them.
pub type Adjacency = IndexMap<NodeId, EdgeAttrs>;

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// The role of a node in federated learning.
pub enum NodeKind {
    #[display(fmt = "client")]
    Client,
    #[display(fmt = "server")]
    Server,
}

impl Default for NodeKind {
    fn default() -> Self {
        DEFAULT_KIND
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// The attributes of a node.
///
/// Every recognized attribute is optional: an absent attribute is filled in by
/// [`NodeAttrs::fill_defaults`], which never overwrites a present one. The accessors return the
/// default value for absent attributes.
pub struct NodeAttrs {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    /// Transmit power.
    #[serde(rename = "send_P", skip_serializing_if = "Option::is_none")]
    pub send_p: Option<f64>,
    /// Receive power.
    #[serde(rename = "recv_P", skip_serializing_if = "Option::is_none")]
    pub recv_p: Option<f64>,
    /// Compute power.
    #[serde(rename = "cal_P", skip_serializing_if = "Option::is_none")]
    pub cal_p: Option<f64>,
    /// Remaining energy, possibly infinite.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_energy"
    )]
    pub energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movable: Option<bool>,
    /// The rank owning the node. Written back by the partitioning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<Rank>,
    /// The outgoing links declared by the description. Kept after loading, pruned on removal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adj: Option<Adjacency>,
    /// Attributes the core does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeAttrs {
    pub fn client() -> Self {
        Self {
            kind: Some(NodeKind::Client),
            ..Default::default()
        }
    }

    pub fn server() -> Self {
        Self {
            kind: Some(NodeKind::Server),
            ..Default::default()
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind.unwrap_or(DEFAULT_KIND)
    }

    pub fn is_client(&self) -> bool {
        self.kind() == NodeKind::Client
    }

    pub fn is_server(&self) -> bool {
        self.kind() == NodeKind::Server
    }

    pub fn send_p(&self) -> f64 {
        self.send_p.unwrap_or(DEFAULT_POWER)
    }

    pub fn recv_p(&self) -> f64 {
        self.recv_p.unwrap_or(DEFAULT_POWER)
    }

    pub fn cal_p(&self) -> f64 {
        self.cal_p.unwrap_or(DEFAULT_POWER)
    }

    pub fn energy(&self) -> f64 {
        self.energy.unwrap_or(DEFAULT_ENERGY)
    }

    pub fn movable(&self) -> bool {
        self.movable.unwrap_or(DEFAULT_MOVABLE)
    }

    /// Sets every absent attribute which has a default value. Present attributes are left as is.
    pub fn fill_defaults(&mut self) {
        self.kind.get_or_insert(DEFAULT_KIND);
        self.send_p.get_or_insert(DEFAULT_POWER);
        self.recv_p.get_or_insert(DEFAULT_POWER);
        self.cal_p.get_or_insert(DEFAULT_POWER);
        self.energy.get_or_insert(DEFAULT_ENERGY);
        self.movable.get_or_insert(DEFAULT_MOVABLE);
    }

    /// Adds an outgoing link to the declared adjacency.
    pub fn link_to(&mut self, neighbor: impl Into<NodeId>, attrs: EdgeAttrs) -> &mut Self {
        self.adj
            .get_or_insert_with(Adjacency::new)
            .insert(neighbor.into(), attrs);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// The attributes of a directed link.
pub struct EdgeAttrs {
    /// The name of the physical layer model of the link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EdgeAttrs {
    pub fn with_channel(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Default::default()
        }
    }
}

/// Accepts a number, a YAML `.inf`, or one of the strings `inf` and `infinity`.
fn deserialize_energy<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnergyVisitor;

    impl<'de> Visitor<'de> for EnergyVisitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a non-negative number or \"inf\"")
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if value.is_nan() || value < 0. {
                Err(de::Error::invalid_value(de::Unexpected::Float(value), &self))
            } else {
                Ok(value)
            }
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value as f64)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            self.visit_f64(value as f64)
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            match value.trim_start_matches('+').to_lowercase().as_str() {
                "inf" | ".inf" | "infinity" => Ok(f64::INFINITY),
                _ => Err(de::Error::invalid_value(de::Unexpected::Str(value), &self)),
            }
        }
    }

    deserializer.deserialize_any(EnergyVisitor).map(Some)
}
