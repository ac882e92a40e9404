//! Local host session using `tokio::process` and `tokio::fs`

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, instrument};

use crate::error::ExecError;
use crate::traits::{CommandResult, HostSession};

/// Local host session
///
/// Runs commands and file operations on the local machine. Used for
/// same-host deployments and in tests.
#[derive(Debug, Clone, Default)]
pub struct LocalSession;

impl LocalSession {
    /// Create a new local session
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostSession for LocalSession {
    #[instrument(skip(self, argv), level = "debug")]
    async fn run(&self, argv: &[String]) -> Result<CommandResult, ExecError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExecError::SpawnError("empty argv".to_string()))?;

        let start = Instant::now();

        debug!(command = ?argv, "executing local command");

        let child = Command::new(program)
            .args(args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let duration = start.elapsed();

        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            error!(
                command = ?argv,
                status = status,
                stderr = %stderr,
                "command failed"
            );
        }

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    #[instrument(skip(self, content), level = "debug")]
    async fn copy(&self, path: &str, content: &[u8]) -> Result<(), ExecError> {
        if let Some(parent) = Path::new(path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
        }

        tokio::fs::write(path, content)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))
    }

    #[instrument(skip(self), level = "debug")]
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ExecError> {
        match tokio::fs::read(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ExecError::IoError(e.to_string())),
        }
    }

    async fn close(&self) -> Result<(), ExecError> {
        Ok(())
    }

    fn session_type(&self) -> &'static str {
        "local"
    }
}
