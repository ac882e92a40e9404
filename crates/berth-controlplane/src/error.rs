//! Error types for berth-controlplane

use thiserror::Error;

/// Errors that can occur while building control-plane containers
#[derive(Error, Debug)]
pub enum ControlplaneError {
    /// Configuration rejected; lists every problem found
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A generated file could not be rendered
    #[error("failed to render {what}: {reason}")]
    Render {
        /// What was being rendered
        what: String,
        /// Underlying failure
        reason: String,
    },
}
