//! Error types for berth-core

use berth_exec::ExecError;
use berth_runtime::RuntimeError;
use thiserror::Error;

/// Errors that can occur while reconciling containers
#[derive(Error, Debug)]
pub enum CoreError {
    /// Input rejected before any I/O; lists every problem found
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// `execute` called without a known current state
    #[error("current state is unknown, call check_current_state first")]
    PreconditionsNotMet,

    /// Network or auth failure talking to a host
    #[error("transport error for container '{name}': {source}")]
    Transport {
        /// Container the operation was for
        name: String,
        source: ExecError,
    },

    /// The container daemon rejected a command
    #[error("runtime error for container '{name}': {source}")]
    Runtime {
        /// Container the operation was for
        name: String,
        source: RuntimeError,
    },

    /// A remote configuration file could not be read during refresh
    #[error("drift check failed for container '{name}', file '{path}': {source}")]
    DriftCheck {
        /// Container owning the file
        name: String,
        /// File that could not be read
        path: String,
        source: ExecError,
    },

    /// Operation on a name the state does not contain
    #[error("container '{0}' does not exist in the state")]
    UnknownContainer(String),

    /// State document could not be parsed
    #[error("failed to parse state document: {0}")]
    Parse(String),

    /// State could not be serialized
    #[error("failed to serialize state: {0}")]
    Serialize(String),

    /// Cooperative cancellation observed
    #[error("operation canceled")]
    Canceled,
}
