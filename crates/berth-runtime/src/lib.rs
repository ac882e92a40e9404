//! berth-runtime: Container runtime client
//!
//! Provides the `ContainerRuntime` trait the reconciler drives, plus a
//! docker implementation that issues `docker` commands through a
//! `HostSession`.

pub mod docker;
pub mod error;
pub mod traits;
pub mod types;

pub use docker::DockerCli;
pub use error::RuntimeError;
pub use traits::ContainerRuntime;
pub use types::{ContainerConfig, ContainerStatus, Mount, PortMap};
