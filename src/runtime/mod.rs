//! The distributed runtime seam.
//!
//! The topology core does not talk to a process group directly. It is handed a [`Runtime`] which
//! reports the rank of the current process, the size of the group, and broadcasts opaque payloads
//! from one rank to all the others.
//!
//! A runtime is created once at process startup by a [`Launcher`], which knows the backends that
//! are available in the current build. Without a backend, the process runs in a [`NoSession`]:
//! rank `0` of a group of one.

pub mod local;

use std::{collections::HashMap, fmt, str::FromStr};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use self::local::{LocalGroup, LocalRank};

/// The identifier of a process within a process group.
pub type Rank = usize;

/// Errors of the distributed runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("the {0} backend is not available")]
    BackendUnavailable(Backend),

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("invalid bootstrap: {0}")]
    InvalidBootstrap(String),

    #[error("broadcast from rank {src} failed: {reason}")]
    Broadcast { src: Rank, reason: String },
}

/// The handle of a process on its process group.
pub trait Runtime: Send {
    /// Whether a distributed session is active.
    fn is_initialized(&self) -> bool;

    /// The rank of the current process.
    fn rank(&self) -> Rank;

    /// The number of processes in the group.
    fn world_size(&self) -> usize;

    /// Broadcasts `payload` from the `src` rank to every rank of the group.
    ///
    /// On `src` the payload is sent and returned. On every other rank the argument is ignored and
    /// the payload sent by `src` is returned. All ranks must call the broadcasts of a given source
    /// in the same order.
    fn broadcast(&self, payload: Vec<u8>, src: Rank) -> Result<Vec<u8>, RuntimeError>;
}

impl<R: Runtime + Sync + ?Sized> Runtime for &R {
    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn rank(&self) -> Rank {
        (**self).rank()
    }

    fn world_size(&self) -> usize {
        (**self).world_size()
    }

    fn broadcast(&self, payload: Vec<u8>, src: Rank) -> Result<Vec<u8>, RuntimeError> {
        (**self).broadcast(payload, src)
    }
}

impl<R: Runtime + ?Sized> Runtime for Box<R> {
    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn rank(&self) -> Rank {
        (**self).rank()
    }

    fn world_size(&self) -> usize {
        (**self).world_size()
    }

    fn broadcast(&self, payload: Vec<u8>, src: Rank) -> Result<Vec<u8>, RuntimeError> {
        (**self).broadcast(payload, src)
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// A process group backend.
pub enum Backend {
    #[display(fmt = "mpi")]
    Mpi,
    #[display(fmt = "gloo")]
    Gloo,
}

impl FromStr for Backend {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mpi" => Ok(Backend::Mpi),
            "gloo" => Ok(Backend::Gloo),
            _ => Err(RuntimeError::UnknownBackend(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Manual overrides for the bootstrap of a process group.
///
/// Whatever is left out is discovered by the backend.
pub struct Bootstrap {
    pub rank: Option<Rank>,
    pub world_size: Option<usize>,
    /// The rendezvous address of the group, e.g. `tcp://10.0.0.1:23456`.
    pub url: Option<String>,
}

impl Bootstrap {
    /// Checks that the overrides are consistent with each other.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        match (self.rank, self.world_size) {
            (_, Some(0)) => Err(RuntimeError::InvalidBootstrap(
                "the world size must be at least 1".into(),
            )),
            (Some(rank), Some(world_size)) if rank >= world_size => {
                Err(RuntimeError::InvalidBootstrap(format!(
                    "rank {} is out of a world of size {}",
                    rank, world_size
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A process running without a distributed session.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSession;

impl Runtime for NoSession {
    fn is_initialized(&self) -> bool {
        false
    }

    fn rank(&self) -> Rank {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn broadcast(&self, payload: Vec<u8>, src: Rank) -> Result<Vec<u8>, RuntimeError> {
        if src == 0 {
            Ok(payload)
        } else {
            Err(RuntimeError::Broadcast {
                src,
                reason: "a process without session only has rank 0".into(),
            })
        }
    }
}

/// Creates the runtime of a backend from the bootstrap overrides.
pub type BackendFactory =
    Box<dyn Fn(&Bootstrap) -> Result<Box<dyn Runtime>, RuntimeError> + Send + Sync>;

/// The registry of the backends available to the process.
#[derive(Default)]
pub struct Launcher {
    backends: HashMap<Backend, BackendFactory>,
}

impl fmt::Debug for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launcher")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Launcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `backend` available.
    pub fn with_backend<F>(mut self, backend: Backend, factory: F) -> Self
    where
        F: Fn(&Bootstrap) -> Result<Box<dyn Runtime>, RuntimeError> + Send + Sync + 'static,
    {
        self.backends.insert(backend, Box::new(factory));
        self
    }

    pub fn is_available(&self, backend: Backend) -> bool {
        self.backends.contains_key(&backend)
    }

    /// Joins the process group of `backend`, or runs without session if no backend is requested.
    ///
    /// # Errors
    /// Fails if the overrides are inconsistent, if the backend is not available, or if the
    /// backend fails to join the group.
    pub fn init_process_group(
        &self,
        backend: Option<Backend>,
        bootstrap: &Bootstrap,
    ) -> Result<Box<dyn Runtime>, RuntimeError> {
        bootstrap.validate()?;
        let backend = match backend {
            Some(backend) => backend,
            None => {
                debug!("no backend requested, running without distributed session");
                return Ok(Box::new(NoSession));
            }
        };
        let factory = self
            .backends
            .get(&backend)
            .ok_or(RuntimeError::BackendUnavailable(backend))?;
        let runtime = factory(bootstrap)?;
        info!(
            "joined {} process group as rank {} of {}",
            backend,
            runtime.rank(),
            runtime.world_size()
        );
        Ok(runtime)
    }
}
