//! kube-controller-manager container generator

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use berth_core::{Container, ContainerConfig, Host, HostConfiguredContainer, Mount};

use crate::Common;
use crate::error::ControlplaneError;
use crate::kubeconfig::Kubeconfig;

const DEFAULT_IMAGE: &str = "registry.k8s.io/kube-controller-manager:v1.31.2";
const CONFIG_DIR: &str = "/etc/kubernetes/kube-controller-manager";

/// kube-controller-manager configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubeControllerManager {
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

    /// PEM private key for signing service account tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_private_key: Option<String>,

    /// Pod network CIDR handed to the node IPAM controller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_cidr: Option<String>,
}

impl KubeControllerManager {
    /// Check the configuration, returning all problems found
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.kubeconfig.validate();

        if self.service_account_private_key.is_none() {
            problems.push("service account private key must be set".to_string());
        }
        if self.common.kubernetes_ca_certificate.is_none() {
            problems.push("kubernetes CA certificate must be set".to_string());
        }

        problems
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
        if let Some(ca) = &self.common.kubernetes_ca_certificate {
            config_files.insert(format!("{CONFIG_DIR}/pki/ca.crt"), ca.clone());
        }
        if let Some(key) = &self.service_account_private_key {
            config_files.insert(format!("{CONFIG_DIR}/pki/service-account.key"), key.clone());
        }

        let mut args = vec![
            format!("--kubeconfig={CONFIG_DIR}/kubeconfig"),
            format!("--root-ca-file={CONFIG_DIR}/pki/ca.crt"),
            format!("--service-account-private-key-file={CONFIG_DIR}/pki/service-account.key"),
            "--use-service-account-credentials=true".to_string(),
        ];

        if let Some(cidr) = &self.cluster_cidr {
            args.push(format!("--cluster-cidr={cidr}"));
            args.push("--allocate-node-cidrs=true".to_string());
        }

        let image = self
            .image
            .clone()
            .or_else(|| self.common.image.clone())
            .unwrap_or_else(|| DEFAULT_IMAGE.to_string());

        Ok(HostConfiguredContainer {
            host: self.host.clone().unwrap_or_default(),
            container: Container {
                config: ContainerConfig {
                    name: "kube-controller-manager".to_string(),
                    image,
                    args,
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
