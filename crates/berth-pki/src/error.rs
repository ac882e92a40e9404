//! Error types for berth-pki

use thiserror::Error;

/// Errors that can occur while realizing a certificate request graph
#[derive(Error, Debug, Clone)]
pub enum PkiError {
    /// Two requests resolve the same target
    #[error("duplicate certificate request: {0}")]
    DuplicateRequest(String),

    /// The CA dependency graph contains a cycle
    #[error("cycle in CA dependency graph involving: {}", .0.join(", "))]
    CycleInCaGraph(Vec<String>),

    /// A request names a CA that is missing or carries no key material
    #[error("CA '{0}' is not resolved")]
    UnresolvedCa(String),

    /// An IP address field could not be parsed
    #[error("invalid IP address '{address}' for certificate '{name}'")]
    InvalidIpAddress {
        /// Request the address belongs to
        name: String,
        /// The offending value
        address: String,
    },

    /// A DNS name is not a valid subject alternative name
    #[error("invalid DNS name '{dns}' for certificate '{name}'")]
    InvalidDnsName {
        /// Request the name belongs to
        name: String,
        /// The offending value
        dns: String,
    },

    /// Key generation or signing failed
    #[error("failed to generate certificate '{name}': {reason}")]
    CertificateGeneration {
        /// Request that failed
        name: String,
        /// Underlying failure
        reason: String,
    },
}
