//! Host session trait

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// A byte channel to one host
///
/// Sessions connect lazily; the first operation opens the underlying
/// transport. All operations may block on network I/O.
#[async_trait]
pub trait HostSession: Send + Sync {
    /// Run a command on the host
    async fn run(&self, argv: &[String]) -> Result<CommandResult, ExecError>;

    /// Write a file on the host, creating parent directories
    async fn copy(&self, path: &str, content: &[u8]) -> Result<(), ExecError>;

    /// Read a file from the host; `None` if the file does not exist
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ExecError>;

    /// Close the underlying transport
    async fn close(&self) -> Result<(), ExecError>;

    /// Short identifier for the transport kind
    fn session_type(&self) -> &'static str;
}
