//! Error types for berth-runtime

use berth_exec::ExecError;
use thiserror::Error;

/// Errors that can occur while driving the container runtime
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// Transport failure while reaching the daemon
    #[error("transport error: {0}")]
    Transport(#[from] ExecError),

    /// The daemon rejected a command
    #[error("docker command failed: {status} - {stderr}")]
    CommandFailed {
        /// Exit status
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Failed to parse daemon output
    #[error("failed to parse docker output: {0}")]
    ParseError(String),
}
