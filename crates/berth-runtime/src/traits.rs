//! Container runtime trait

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::types::{ContainerConfig, ContainerStatus};

/// Client for the container daemon on one host
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container from the given spec, returning the daemon-assigned id
    async fn create(&self, config: &ContainerConfig) -> Result<String, RuntimeError>;

    /// Start a created container
    async fn start(&self, id: &str) -> Result<(), RuntimeError>;

    /// Stop a running container
    async fn stop(&self, id: &str) -> Result<(), RuntimeError>;

    /// Remove a stopped container
    async fn remove(&self, id: &str) -> Result<(), RuntimeError>;

    /// Observe a container's status by name or id
    ///
    /// A container unknown to the daemon yields a status with
    /// `exists == false` rather than an error.
    async fn inspect(&self, name: &str) -> Result<ContainerStatus, RuntimeError>;

    /// Short identifier for the runtime kind
    fn runtime_type(&self) -> &'static str;
}
