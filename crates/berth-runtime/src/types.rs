//! Type definitions for the container runtime spec

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Runtime spec of a single container
///
/// This is user input; equality is structural and any difference between
/// the running container's spec and the desired one forces a recreate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerConfig {
    /// Container name, unique per host
    pub name: String,
    /// Image reference
    pub image: String,
    /// Override the image entrypoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    /// Arguments passed to the entrypoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Bind mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    /// Published ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMap>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Network mode (e.g. "host")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    /// Run with extended privileges
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
}

impl ContainerConfig {
    /// Check the spec is well-formed, returning all problems found
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.is_empty() {
            problems.push("container name must not be empty".to_string());
        }
        if self.image.is_empty() {
            problems.push("container image must not be empty".to_string());
        }
        for mount in &self.mounts {
            if !mount.source.starts_with('/') {
                problems.push(format!("mount source '{}' must be absolute", mount.source));
            }
            if !mount.target.starts_with('/') {
                problems.push(format!("mount target '{}' must be absolute", mount.target));
            }
        }

        problems
    }
}

/// A bind mount from host path to container path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Mount {
    /// Host path
    pub source: String,
    /// Container path
    pub target: String,
    /// Mount read-only
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

/// A published port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortMap {
    /// Port on the host
    pub host_port: u16,
    /// Port inside the container
    pub container_port: u16,
    /// Protocol (default tcp)
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// Runtime-observed status of a container
///
/// Not user input; populated by `inspect` and persisted so the next run
/// knows which containers it believes exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerStatus {
    /// Daemon-assigned identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Whether the daemon knows the container
    #[serde(default)]
    pub exists: bool,
    /// Whether the container is running
    #[serde(default)]
    pub running: bool,
}

impl ContainerStatus {
    /// Status of a container the daemon does not know
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        let config = ContainerConfig {
            name: "etcd".to_string(),
            image: "quay.io/coreos/etcd:v3.5".to_string(),
            mounts: vec![Mount {
                source: "/var/lib/etcd".to_string(),
                target: "/data".to_string(),
                read_only: false,
            }],
            ..Default::default()
        };
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_rejects_empty_and_relative() {
        let config = ContainerConfig {
            name: String::new(),
            image: String::new(),
            mounts: vec![Mount {
                source: "data".to_string(),
                target: "/data".to_string(),
                read_only: false,
            }],
            ..Default::default()
        };
        let problems = config.validate();
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn test_config_equality_is_structural() {
        let a = ContainerConfig {
            name: "web".to_string(),
            image: "nginx:1.27".to_string(),
            ..Default::default()
        };
        let mut b = a.clone();
        assert_eq!(a, b);

        b.image = "nginx:1.28".to_string();
        assert_ne!(a, b);
    }
}
