//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by environment variables prefixed
//! with `FLTOPO_`, nested keys being separated by `__`. An example configuration file can be found
//! in the `configs/` directory located in the repository root.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, Environment};
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    model::ParameterList,
    runtime::{Backend, Bootstrap, Rank},
    topology::TopologySource,
};

#[derive(Error, Debug)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// The combined settings.
///
/// Each section in the configuration file corresponds to the identically named settings field.
pub struct Settings {
    pub log: LoggingSettings,
    #[serde(default)]
    #[validate]
    pub runtime: RuntimeSettings,
    pub topology: TopologySettings,
    #[serde(default)]
    pub model: ModelSettings,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(config::File::from(path.as_ref()))?;
        config.merge(Environment::with_prefix("fltopo").separator("__"))?;
        config.try_into()
    }
}

#[derive(Debug, Default, Clone, Validate, Deserialize)]
#[validate(schema(function = "validate_runtime"))]
/// Distributed runtime settings.
///
/// Without a backend the process runs without distributed session, as rank `0` of a group of one.
pub struct RuntimeSettings {
    /// The process group backend.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [runtime]
    /// backend = "gloo"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FLTOPO_RUNTIME__BACKEND=gloo
    /// ```
    pub backend: Option<Backend>,
    /// The rank of the process, if not discovered by the backend.
    pub rank: Option<Rank>,
    /// The size of the process group, if not discovered by the backend.
    pub world_size: Option<usize>,
    /// The rendezvous address of the process group.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [runtime]
    /// url = "tcp://127.0.0.1:23456"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FLTOPO_RUNTIME__URL=tcp://127.0.0.1:23456
    /// ```
    pub url: Option<String>,
}

impl RuntimeSettings {
    /// Checks the bootstrap overrides.
    fn validate_runtime(&self) -> Result<(), ValidationError> {
        match (self.rank, self.world_size) {
            (_, Some(0)) => Err(ValidationError::new("empty world")),
            (Some(rank), Some(world_size)) if rank >= world_size => {
                Err(ValidationError::new("rank out of world"))
            }
            _ => Ok(()),
        }
    }

    pub fn bootstrap(&self) -> Bootstrap {
        Bootstrap {
            rank: self.rank,
            world_size: self.world_size,
            url: self.url.clone(),
        }
    }
}

/// A wrapper for validate derive.
fn validate_runtime(s: &RuntimeSettings) -> Result<(), ValidationError> {
    s.validate_runtime()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Topology settings.
///
/// Exactly one of the sections below must be given.
///
/// # Examples
///
/// **TOML**
/// ```text
/// [topology.static]
/// clients = 5
/// ```
///
/// ```text
/// [topology.file]
/// path = "data/simple_graph.yaml"
/// ```
pub enum TopologySettings {
    /// A description file, in YAML or JSON.
    File(FileTopologySettings),
    /// A generated star of one server and `clients` clients.
    Static(StaticTopologySettings),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileTopologySettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct StaticTopologySettings {
    pub clients: usize,
}

impl TopologySettings {
    pub fn source(&self) -> TopologySource {
        match self {
            TopologySettings::File(FileTopologySettings { path }) => {
                TopologySource::File(path.clone())
            }
            TopologySettings::Static(StaticTopologySettings { clients }) => {
                TopologySource::StaticStar {
                    n_clients: *clients,
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
/// Model settings.
///
/// The parameters of the model the topology is bound to. Without parameters the model size is `0`.
///
/// # Examples
///
/// **TOML**
/// ```text
/// [[model.parameters]]
/// name = "conv1.weight"
/// elements = 288
/// ```
pub struct ModelSettings {
    #[serde(default)]
    pub parameters: Vec<ParameterSettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterSettings {
    pub name: String,
    pub elements: usize,
}

impl ModelSettings {
    pub fn parameter_list(&self) -> ParameterList {
        self.parameters
            .iter()
            .map(|ParameterSettings { name, elements }| (name.as_str(), *elements))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
/// Logging settings.
pub struct LoggingSettings {
    /// A comma-separated list of logging directives. More information about logging directives
    /// can be found [here].
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FLTOPO_LOG__FILTER=info
    /// ```
    ///
    /// [here]: https://docs.rs/tracing-subscriber/0.2.15/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}
