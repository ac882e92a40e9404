//! berth-exec: Host transport abstraction
//!
//! A `HostSession` is a byte channel to a single host: it runs commands,
//! copies files onto the host and reads them back. Implementations exist
//! for SSH (russh) and for the local machine.

pub mod error;
pub mod host;
pub mod keys;
pub mod local;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use host::{Host, SshConfig};
pub use local::LocalSession;
pub use ssh::SshSession;
pub use traits::{CommandResult, HostSession};
