//! Docker runtime client
//!
//! Drives the `docker` binary on a host through a `HostSession`, so the
//! same client works for local and SSH-reached daemons.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use berth_exec::{CommandResult, ExecError, HostSession};

use crate::error::RuntimeError;
use crate::traits::ContainerRuntime;
use crate::types::{ContainerConfig, ContainerStatus};

/// Docker CLI runtime client
pub struct DockerCli {
    session: Arc<dyn HostSession>,
}

impl DockerCli {
    /// Create a client issuing docker commands through the given session
    pub fn new(session: Arc<dyn HostSession>) -> Self {
        Self { session }
    }

    async fn docker(&self, args: &[String]) -> Result<CommandResult, ExecError> {
        let mut argv = vec!["docker".to_string()];
        argv.extend_from_slice(args);
        self.session.run(&argv).await
    }

    async fn docker_checked(&self, args: &[String]) -> Result<CommandResult, RuntimeError> {
        let result = self.docker(args).await?;
        if !result.success() {
            return Err(RuntimeError::CommandFailed {
                status: result.status,
                stderr: result.stderr,
            });
        }
        Ok(result)
    }
}

/// Build the `docker create` argument list for a spec
fn create_args(config: &ContainerConfig) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        config.name.clone(),
    ];

    if config.privileged {
        args.push("--privileged".to_string());
    }
    if let Some(mode) = &config.network_mode {
        args.push("--network".to_string());
        args.push(mode.clone());
    }
    if let Some(entrypoint) = &config.entrypoint {
        args.push("--entrypoint".to_string());
        args.push(entrypoint.clone());
    }
    for mount in &config.mounts {
        let mut spec = format!("{}:{}", mount.source, mount.target);
        if mount.read_only {
            spec.push_str(":ro");
        }
        args.push("-v".to_string());
        args.push(spec);
    }
    for port in &config.ports {
        args.push("-p".to_string());
        args.push(format!(
            "{}:{}/{}",
            port.host_port, port.container_port, port.protocol
        ));
    }
    for (key, value) in &config.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }

    args.push(config.image.clone());
    args.extend(config.args.iter().cloned());

    args
}

/// One entry of `docker container inspect` output
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    id: String,
    state: InspectState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
}

/// Parse `docker container inspect` JSON into a status
fn parse_inspect(output: &str) -> Result<ContainerStatus, RuntimeError> {
    let entries: Vec<InspectEntry> = serde_json::from_str(output)
        .map_err(|e| RuntimeError::ParseError(e.to_string()))?;

    match entries.first() {
        None => Ok(ContainerStatus::absent()),
        Some(entry) => Ok(ContainerStatus {
            id: Some(entry.id.clone()),
            exists: true,
            running: entry.state.running,
        }),
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    #[instrument(skip(self, config), fields(container = %config.name))]
    async fn create(&self, config: &ContainerConfig) -> Result<String, RuntimeError> {
        debug!(image = %config.image, "creating container");

        let result = self.docker_checked(&create_args(config)).await?;
        let id = result.stdout.trim().to_string();

        info!(container = %config.name, id = %id, "container created");

        Ok(id)
    }

    #[instrument(skip(self))]
    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker_checked(&args(&["start", id])).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker_checked(&args(&["stop", id])).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker_checked(&args(&["rm", id])).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn inspect(&self, name: &str) -> Result<ContainerStatus, RuntimeError> {
        let result = self.docker(&args(&["container", "inspect", name])).await?;

        if !result.success() {
            // Unknown containers exit non-zero with "No such" on stderr;
            // anything else is a real daemon failure.
            if result.stderr.contains("No such") {
                return Ok(ContainerStatus::absent());
            }
            return Err(RuntimeError::CommandFailed {
                status: result.status,
                stderr: result.stderr,
            });
        }

        parse_inspect(&result.stdout)
    }

    fn runtime_type(&self) -> &'static str {
        "docker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Mount, PortMap};

    #[test]
    fn test_create_args_minimal() {
        let config = ContainerConfig {
            name: "web".to_string(),
            image: "nginx:1.27".to_string(),
            ..Default::default()
        };

        assert_eq!(
            create_args(&config),
            args(&["create", "--name", "web", "nginx:1.27"])
        );
    }

    #[test]
    fn test_create_args_full() {
        let config = ContainerConfig {
            name: "kube-apiserver".to_string(),
            image: "registry.k8s.io/kube-apiserver:v1.31.0".to_string(),
            entrypoint: Some("/kube-apiserver".to_string()),
            args: vec!["--secure-port=6443".to_string()],
            mounts: vec![Mount {
                source: "/etc/kubernetes".to_string(),
                target: "/etc/kubernetes".to_string(),
                read_only: true,
            }],
            ports: vec![PortMap {
                host_port: 6443,
                container_port: 6443,
                protocol: "tcp".to_string(),
            }],
            env: [("GOGC".to_string(), "50".to_string())].into(),
            network_mode: Some("host".to_string()),
            privileged: false,
        };

        let built = create_args(&config);
        assert!(built.contains(&"--network".to_string()));
        assert!(built.contains(&"/etc/kubernetes:/etc/kubernetes:ro".to_string()));
        assert!(built.contains(&"6443:6443/tcp".to_string()));
        assert!(built.contains(&"GOGC=50".to_string()));
        assert_eq!(built.last().unwrap(), "--secure-port=6443");
    }

    #[test]
    fn test_parse_inspect_running() {
        let output = r#"[{"Id":"abc123","State":{"Running":true,"Status":"running"},"Name":"/web"}]"#;
        let status = parse_inspect(output).unwrap();

        assert_eq!(status.id.as_deref(), Some("abc123"));
        assert!(status.exists);
        assert!(status.running);
    }

    #[test]
    fn test_parse_inspect_stopped() {
        let output = r#"[{"Id":"abc123","State":{"Running":false}}]"#;
        let status = parse_inspect(output).unwrap();

        assert!(status.exists);
        assert!(!status.running);
    }

    #[test]
    fn test_parse_inspect_empty() {
        let status = parse_inspect("[]").unwrap();
        assert!(!status.exists);
        assert!(status.id.is_none());
    }

    #[test]
    fn test_parse_inspect_garbage() {
        assert!(matches!(
            parse_inspect("not json"),
            Err(RuntimeError::ParseError(_))
        ));
    }
}
