//! berth-core: Declarative container reconciliation
//!
//! A caller describes the set of containers that should exist (desired
//! state) together with the state persisted from the last run (previous
//! state). The engine probes the hosts for what actually exists, then
//! creates missing containers, restarts stopped ones, rewrites drifted
//! configuration files and recreates containers whose host or runtime
//! spec changed. The exported state it returns is what the caller
//! persists for the next run.

pub mod container;
pub mod containers;
pub mod diff;
pub mod error;
pub mod factory;
pub mod state;

pub use container::{Container, HostConfiguredContainer};
pub use containers::{Containers, Engine};
pub use error::CoreError;
pub use factory::{DefaultSessionFactory, SessionFactory};
pub use state::ContainersState;

// The placement and runtime spec types are part of this crate's API.
pub use berth_exec::{Host, SshConfig};
pub use berth_runtime::{ContainerConfig, ContainerStatus, Mount, PortMap};
