//! kube-scheduler container generator

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use berth_core::{Container, ContainerConfig, Host, HostConfiguredContainer, Mount};

use crate::Common;
use crate::error::ControlplaneError;
use crate::kubeconfig::Kubeconfig;

const DEFAULT_IMAGE: &str = "registry.k8s.io/kube-scheduler:v1.31.2";
const CONFIG_DIR: &str = "/etc/kubernetes/kube-scheduler";

/// kube-scheduler configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubeScheduler {
    /// Shared settings, filled from the control plane when unset
    #[serde(default, skip_serializing_if = "Common::is_unset")]
    pub common: Common,

    /// Host to place the container on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<Host>,

    /// Image override for this component
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Client kubeconfig for talking to the API server
    pub kubeconfig: Kubeconfig,
}

impl KubeScheduler {
    /// Check the configuration, returning all problems found
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        self.kubeconfig.validate()
    }

    /// Build the host-configured container for this component
    pub fn to_host_configured_container(
        &self,
    ) -> Result<HostConfiguredContainer, ControlplaneError> {
        let mut config_files = BTreeMap::new();
        config_files.insert(
            format!("{CONFIG_DIR}/kubeconfig"),
            self.kubeconfig.render()?,
        );

        let image = self
            .image
            .clone()
            .or_else(|| self.common.image.clone())
            .unwrap_or_else(|| DEFAULT_IMAGE.to_string());

        Ok(HostConfiguredContainer {
            host: self.host.clone().unwrap_or_default(),
            container: Container {
                config: ContainerConfig {
                    name: "kube-scheduler".to_string(),
                    image,
                    args: vec![format!("--kubeconfig={CONFIG_DIR}/kubeconfig")],
                    mounts: vec![Mount {
                        source: CONFIG_DIR.to_string(),
                        target: CONFIG_DIR.to_string(),
                        read_only: true,
                    }],
                    network_mode: Some("host".to_string()),
                    ..Default::default()
                },
                status: None,
            },
            config_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubeconfig_is_required() {
        assert_eq!(KubeScheduler::default().validate().len(), 4);
    }

    #[test]
    fn test_container_is_minimal() {
        let scheduler = KubeScheduler {
            kubeconfig: Kubeconfig {
                server: Some("https://10.0.0.10:6443".to_string()),
                ca_certificate: Some("ca".to_string()),
                client_certificate: Some("cert".to_string()),
                client_key: Some("key".to_string()),
            },
            ..Default::default()
        };

        let container = scheduler.to_host_configured_container().unwrap();

        assert_eq!(container.container.config.name, "kube-scheduler");
        assert_eq!(
            container.container.config.args,
            vec!["--kubeconfig=/etc/kubernetes/kube-scheduler/kubeconfig".to_string()]
        );
        assert_eq!(container.config_files.len(), 1);
    }
}
