//! berth-pki: Certificate generation as a dependency graph
//!
//! Certificates are described as templates merged along an inheritance
//! chain; a batch of certificate requests is realized in topological
//! order of their CA dependencies, so signing always happens after the
//! issuing CA is resolved. A fixed request graph produces the PKI of a
//! static Kubernetes control plane.

pub mod certificate;
pub mod engine;
pub mod error;
pub mod kubernetes;

pub use certificate::{Certificate, KeyUsage};
pub use engine::{CertificateRequest, build_and_generate};
pub use error::PkiError;
pub use kubernetes::{KubeApiServer, Kubernetes};
