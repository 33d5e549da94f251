//! Where a topology description comes from.

use std::path::PathBuf;

use crate::topology::{RandMethod, RandTopo, TopologyDescription, TopologyError};

#[derive(Clone, Debug, PartialEq)]
/// A producer of topology descriptions.
///
/// Every variant yields a description which is then loaded by [`Topo::load_from_dict`]. All ranks
/// must use the same source for their partitions to agree.
///
/// [`Topo::load_from_dict`]: crate::topology::Topo::load_from_dict
pub enum TopologySource {
    /// An explicit description.
    Mapping(TopologyDescription),
    /// A description file, see [`TopologyDescription::from_path`].
    File(PathBuf),
    /// A star generated by [`RandTopo`].
    StaticStar { n_clients: usize },
}

impl TopologySource {
    pub fn describe(&self) -> Result<TopologyDescription, TopologyError> {
        match self {
            TopologySource::Mapping(description) => Ok(description.clone()),
            TopologySource::File(path) => TopologyDescription::from_path(path),
            TopologySource::StaticStar { n_clients } => Ok(RandTopo::new(RandMethod::Static {
                n_clients: *n_clients,
            })
            .description()),
        }
    }
}

impl From<TopologyDescription> for TopologySource {
    fn from(description: TopologyDescription) -> Self {
        TopologySource::Mapping(description)
    }
}

impl From<RandMethod> for TopologySource {
    fn from(method: RandMethod) -> Self {
        match method {
            RandMethod::Static { n_clients } => TopologySource::StaticStar { n_clients },
        }
    }
}
