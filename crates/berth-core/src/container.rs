//! Host-configured container
//!
//! One container's placement, runtime spec and the configuration files
//! it owns on the target host.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use berth_exec::Host;
use berth_runtime::{ContainerConfig, ContainerStatus};

/// Runtime spec together with the last observed status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Container {
    /// User-defined runtime spec
    pub config: ContainerConfig,
    /// Runtime-observed status; absent until the container was probed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ContainerStatus>,
}

impl Container {
    /// Whether the daemon knows this container
    #[must_use]
    pub fn exists(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.exists)
    }

    /// Whether this container is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.running)
    }
}

/// A single container's placement, spec and owned configuration files
///
/// The reconciler, not the container, owns the file contents: any
/// divergence on the host is drift and will be rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostConfiguredContainer {
    /// Where the container is placed
    #[serde(default)]
    pub host: Host,
    /// Runtime spec and status
    pub container: Container,
    /// Absolute path on the host to file content
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config_files: BTreeMap<String, String>,
}

impl HostConfiguredContainer {
    /// Check the container definition, returning all problems found
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.host.validate();

        problems.extend(self.container.config.validate());

        for path in self.config_files.keys() {
            if !path.starts_with('/') {
                problems.push(format!("config file path '{path}' must be absolute"));
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hcc() -> HostConfiguredContainer {
        HostConfiguredContainer {
            host: Host::default(),
            container: Container {
                config: ContainerConfig {
                    name: "etcd".to_string(),
                    image: "quay.io/coreos/etcd:v3.5".to_string(),
                    ..Default::default()
                },
                status: None,
            },
            config_files: BTreeMap::new(),
        }
    }

    #[test]
    fn test_valid_container() {
        assert!(hcc().validate().is_empty());
    }

    #[test]
    fn test_relative_config_file_path_rejected() {
        let mut container = hcc();
        container
            .config_files
            .insert("etc/etcd.yaml".to_string(), "{}".to_string());

        let problems = container.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("must be absolute"));
    }

    #[test]
    fn test_status_accessors() {
        let mut container = hcc();
        assert!(!container.container.exists());
        assert!(!container.container.is_running());

        container.container.status = Some(ContainerStatus {
            id: Some("abc".to_string()),
            exists: true,
            running: false,
        });
        assert!(container.container.exists());
        assert!(!container.container.is_running());
    }
}
