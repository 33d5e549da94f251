//! The declarative topology description.
//!
//! A description maps node identifiers to node records. The shape is the one of the topology
//! files, e.g. in YAML:
//!
//! ```text
//! c0:
//!   type: server
//!   energy: .inf
//!   adj:
//!     c1: {channel: Gaussian}
//! c1:
//!   type: client
//!   adj:
//!     c0: {channel: Gaussian}
//! ```
//!
//! The order of the nodes in the source text is preserved.

use std::{fs, path::Path};

use derive_more::From;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::topology::{NodeAttrs, NodeId, TopologyError};

#[derive(Clone, Debug, Default, From, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
/// A topology description, node records in declaration order.
pub struct TopologyDescription(IndexMap<NodeId, NodeAttrs>);

impl TopologyDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a YAML description.
    pub fn from_yaml_str(text: &str) -> Result<Self, TopologyError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Parses a JSON description.
    pub fn from_json_str(text: &str) -> Result<Self, TopologyError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a description file. Files ending in `.json` are parsed as JSON, anything else as
    /// YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String, TopologyError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn insert(&mut self, node: impl Into<NodeId>, attrs: NodeAttrs) -> Option<NodeAttrs> {
        self.0.insert(node.into(), attrs)
    }

    pub fn get(&self, node: &str) -> Option<&NodeAttrs> {
        self.0.get(node)
    }

    pub fn get_mut(&mut self, node: &str) -> Option<&mut NodeAttrs> {
        self.0.get_mut(node)
    }

    pub fn contains(&self, node: &str) -> bool {
        self.0.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeAttrs)> + '_ {
        self.0.iter()
    }

    /// Checks that every declared link points to a declared node.
    pub fn validate(&self) -> Result<(), TopologyError> {
        for (node, attrs) in self.iter() {
            for neighbor in attrs.adj.iter().flat_map(|adj| adj.keys()) {
                if !self.contains(neighbor.as_str()) {
                    return Err(TopologyError::MalformedTopology(format!(
                        "node {} is linked to the undeclared node {}",
                        node, neighbor
                    )));
                }
            }
        }
        Ok(())
    }
}

impl IntoIterator for TopologyDescription {
    type Item = (NodeId, NodeAttrs);
    type IntoIter = indexmap::map::IntoIter<NodeId, NodeAttrs>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl std::iter::FromIterator<(NodeId, NodeAttrs)> for TopologyDescription {
    fn from_iter<I: IntoIterator<Item = (NodeId, NodeAttrs)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::NodeKind;

    const SIMPLE: &str = "
c0:
  type: server
  energy: .inf
  adj:
    c2: {channel: Gaussian}
    c1: {channel: Gaussian}
c2:
  adj:
    c0: {channel: Gaussian}
c1:
  type: client
  movable: true
  adj:
    c0: {channel: Gaussian}
";

    #[test]
    fn test_yaml_keeps_declaration_order() {
        let description = TopologyDescription::from_yaml_str(SIMPLE).unwrap();
        let ids: Vec<_> = description.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c2", "c1"]);

        let c0 = description.get("c0").unwrap();
        assert_eq!(c0.kind, Some(NodeKind::Server));
        assert!(c0.energy().is_infinite());
        let adj: Vec<_> = c0.adj.as_ref().unwrap().keys().map(NodeId::as_str).collect();
        assert_eq!(adj, vec!["c2", "c1"]);
        assert!(description.get("c2").unwrap().kind.is_none());
        assert!(description.validate().is_ok());
    }

    #[test]
    fn test_json() {
        let description = TopologyDescription::from_json_str(
            r#"{"s": {"type": "server", "adj": {}}, "a": {"adj": {"s": {"channel": "Rayleigh"}}}}"#,
        )
        .unwrap();
        assert_eq!(description.len(), 2);
        assert!(description.validate().is_ok());
    }

    #[test]
    fn test_non_mapping_record_is_malformed() {
        for text in &["c0: 3", "c0: [a, b]", "c0: text", "- c0\n- c1"] {
            match TopologyDescription::from_yaml_str(text) {
                Err(TopologyError::MalformedTopology(_)) => {}
                other => panic!("{:?} was accepted: {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_link_to_undeclared_node_is_malformed() {
        let description =
            TopologyDescription::from_yaml_str("c0: {adj: {c9: {channel: Gaussian}}}").unwrap();
        assert!(matches!(
            description.validate(),
            Err(TopologyError::MalformedTopology(_))
        ));
    }

    #[test]
    fn test_yaml_round_trip_keeps_extras() {
        let text = "c0:\n  type: server\n  zone: north\n";
        let description = TopologyDescription::from_yaml_str(text).unwrap();
        let again =
            TopologyDescription::from_yaml_str(&description.to_yaml_string().unwrap()).unwrap();
        assert_eq!(description, again);
        assert_eq!(
            again.get("c0").unwrap().extra["zone"],
            serde_json::json!("north")
        );
    }
}
