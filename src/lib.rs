//! # fl-topo
//!
//! The topology and partition core of a toy federated learning simulator.
//!
//! A simulation runs on a group of processes, the ranks. All ranks load the same
//! [`topology::TopologyDescription`] (a file or a generated star), build the same graph of
//! servers and clients, and each rank simulates the nodes of its own partition set. Topology
//! changes are decided by the monitor rank and broadcast to the others through the
//! [`runtime::Runtime`] seam, so that all ranks keep agreeing on the graph and its partition.
//!
//! The crate is organized as follows:
//! - [`topology`]: node records, the graph store, the partition table and the [`topology::Topo`]
//!   lifecycle manager, together with the description sources.
//! - [`runtime`]: the distributed runtime seam, a launcher for the available backends and an
//!   in-memory process group.
//! - [`model`]: the model seam used for reporting.
//! - [`settings`]: the configuration of the `fl-topo` binary.

pub mod model;
pub mod runtime;
pub mod settings;
pub mod topology;
