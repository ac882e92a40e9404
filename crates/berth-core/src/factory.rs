//! Session and runtime construction
//!
//! The engine never opens transports itself; a `SessionFactory` maps a
//! `Host` descriptor to the handles it needs, which lets tests inject
//! in-memory fakes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use berth_exec::{ExecError, Host, HostSession, LocalSession, SshSession};
use berth_runtime::{ContainerRuntime, DockerCli};

/// Factory for per-host transport and runtime handles
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open (or reuse) a session to the given host
    async fn session(&self, host: &Host) -> Result<Arc<dyn HostSession>, ExecError>;

    /// Runtime client for the given host
    async fn runtime(&self, host: &Host) -> Result<Arc<dyn ContainerRuntime>, ExecError>;
}

/// Default factory: SSH or local sessions, docker runtime
///
/// Sessions are cached per host so repeated operations against the same
/// host share one connection.
#[derive(Default)]
pub struct DefaultSessionFactory {
    sessions: Mutex<HashMap<Host, Arc<dyn HostSession>>>,
}

impl DefaultSessionFactory {
    /// Create a new factory with an empty session cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionFactory for DefaultSessionFactory {
    async fn session(&self, host: &Host) -> Result<Arc<dyn HostSession>, ExecError> {
        let mut cache = self.sessions.lock().await;

        if let Some(session) = cache.get(host) {
            return Ok(session.clone());
        }

        let session: Arc<dyn HostSession> = match &host.ssh {
            Some(config) => Arc::new(SshSession::new(config.clone())?),
            None => Arc::new(LocalSession::new()),
        };

        cache.insert(host.clone(), session.clone());
        Ok(session)
    }

    async fn runtime(&self, host: &Host) -> Result<Arc<dyn ContainerRuntime>, ExecError> {
        let session = self.session(host).await?;
        Ok(Arc::new(DockerCli::new(session)))
    }
}
