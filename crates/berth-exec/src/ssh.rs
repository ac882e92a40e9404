//! SSH host session using russh crate

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::ExecError;
use crate::host::SshConfig;
use crate::keys::ResolvedKey;
use crate::traits::{CommandResult, HostSession};

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        // In production, this should verify against known_hosts
        Ok(true)
    }
}

/// SSH host session
///
/// Holds one SSH connection to a host. The connection is established on
/// first use and reused for subsequent operations.
pub struct SshSession {
    /// Connection settings
    config: SshConfig,
    /// Resolved SSH key
    key: ResolvedKey,
    /// SSH session (initialized on first use)
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("config", &self.config)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl SshSession {
    /// Create a new SSH session for the given connection settings
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if key resolution fails
    pub fn new(config: SshConfig) -> Result<Self, ExecError> {
        let key = config
            .key_source()
            .resolve()
            .map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        Ok(Self {
            config,
            key,
            session: Mutex::new(None),
        })
    }

    /// Connect to the remote host
    #[instrument(skip(self), fields(host = %self.config.address))]
    async fn connect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        info!(
            host = %self.config.address,
            port = self.config.port,
            user = %self.config.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());

        let mut session = client::connect(
            config,
            (&self.config.address[..], self.config.port),
            SshClientHandler,
        )
        .await
        .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        self.authenticate(&mut session).await?;

        info!(host = %self.config.address, "SSH connected and authenticated");

        *session_lock = Some(session);
        Ok(())
    }

    async fn authenticate(
        &self,
        session: &mut client::Handle<SshClientHandler>,
    ) -> Result<(), ExecError> {
        if self.key.use_agent() {
            // TODO: Implement SSH agent support
            return Err(ExecError::AuthenticationFailed(
                "SSH agent authentication not yet implemented".to_string(),
            ));
        }

        let Some(key_path) = self.key.path() else {
            return Err(ExecError::AuthenticationFailed(
                "no authentication method available".to_string(),
            ));
        };

        let key_pair =
            load_secret_key(key_path, None).map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();

        let auth_res = session
            .authenticate_publickey(
                &self.config.user,
                PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
            )
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

        if !auth_res.success() {
            return Err(ExecError::AuthenticationFailed(
                "public key authentication rejected".to_string(),
            ));
        }

        Ok(())
    }

    /// Execute a command line, optionally feeding bytes to stdin
    #[instrument(skip(self, cmd, stdin), fields(host = %self.config.address))]
    async fn exec_channel(
        &self,
        cmd: &str,
        stdin: Option<&[u8]>,
    ) -> Result<CommandResult, ExecError> {
        self.connect().await?;

        let mut session_lock = self.session.lock().await;
        let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        if let Some(data) = stdin {
            channel
                .data(data)
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            channel
                .eof()
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
        }

        // Collect output
        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        loop {
            let msg = channel.wait().await;

            match msg {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        // stderr
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    status = exit_status.cast_signed();
                }
                Some(ChannelMsg::Eof) | None => break,
                _ => {}
            }
        }

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "remote command completed"
        );

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

#[async_trait]
impl HostSession for SshSession {
    #[instrument(skip(self, argv), fields(host = %self.config.address))]
    async fn run(&self, argv: &[String]) -> Result<CommandResult, ExecError> {
        self.exec_channel(&join_argv(argv), None).await
    }

    #[instrument(skip(self, content), fields(host = %self.config.address, path = %path))]
    async fn copy(&self, path: &str, content: &[u8]) -> Result<(), ExecError> {
        let dir = parent_dir(path);
        let cmd = format!(
            "mkdir -p {} && cat > {}",
            shell_quote(&dir),
            shell_quote(path)
        );

        let result = self.exec_channel(&cmd, Some(content)).await?;
        if !result.success() {
            return Err(ExecError::CommandFailed {
                status: result.status,
                stderr: result.stderr,
            });
        }

        Ok(())
    }

    #[instrument(skip(self), fields(host = %self.config.address, path = %path))]
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ExecError> {
        let probe = self
            .exec_channel(&format!("test -e {}", shell_quote(path)), None)
            .await?;
        if !probe.success() {
            return Ok(None);
        }

        let result = self
            .exec_channel(&format!("cat {}", shell_quote(path)), None)
            .await?;
        if !result.success() {
            return Err(ExecError::CommandFailed {
                status: result.status,
                stderr: result.stderr,
            });
        }

        Ok(Some(result.stdout.into_bytes()))
    }

    async fn close(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            info!(host = %self.config.address, "SSH disconnected");
        }
        Ok(())
    }

    fn session_type(&self) -> &'static str {
        "ssh"
    }
}

/// Quote an argument for the remote shell
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+".contains(c));

    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Join an argv into a single remote command line
fn join_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Directory component of an absolute path, "/" when there is none
fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_passthrough() {
        assert_eq!(shell_quote("/etc/kubernetes/ca.pem"), "/etc/kubernetes/ca.pem");
        assert_eq!(shell_quote("docker"), "docker");
    }

    #[test]
    fn test_shell_quote_special() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_join_argv() {
        let argv = vec!["docker".to_string(), "rm".to_string(), "my app".to_string()];
        assert_eq!(join_argv(&argv), "docker rm 'my app'");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("/etc/berth/config.yaml"), "/etc/berth");
        assert_eq!(parent_dir("/config.yaml"), "/");
    }

    // Connection tests require an SSH server - marked as ignored
    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_ssh_connection() {}
}
