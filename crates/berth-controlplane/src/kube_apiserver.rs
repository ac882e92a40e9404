//! kube-apiserver container generator

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use berth_core::{
    Container, ContainerConfig, Host, HostConfiguredContainer, Mount,
};

use crate::Common;
use crate::error::ControlplaneError;

const DEFAULT_IMAGE: &str = "registry.k8s.io/kube-apiserver:v1.31.2";
const CONFIG_DIR: &str = "/etc/kubernetes/kube-apiserver";

/// kube-apiserver configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubeApiServer {
    /// Shared settings, filled from the control plane when unset
    #[serde(default, skip_serializing_if = "Common::is_unset")]
    pub common: Common,

    /// Host to place the container on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<Host>,

    /// Image override for this component
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// etcd endpoints
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub etcd_servers: Vec<String>,

    /// Service cluster IP range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_cidr: Option<String>,

    /// Address to bind the secure port on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Address advertised to cluster members
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,

    /// Secure port (default 6443)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure_port: Option<u16>,

    /// PEM serving certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_server_certificate: Option<String>,
    /// PEM serving key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_server_key: Option<String>,
    /// PEM public key for verifying service account tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_public_key: Option<String>,
    /// PEM client certificate for kubelet connections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubelet_client_certificate: Option<String>,
    /// PEM client key for kubelet connections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubelet_client_key: Option<String>,
    /// PEM front proxy client certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_proxy_client_certificate: Option<String>,
    /// PEM front proxy client key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_proxy_client_key: Option<String>,
}

impl KubeApiServer {
    /// Check the configuration, returning all problems found
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.etcd_servers.is_empty() {
            problems.push("at least one etcd server must be set".to_string());
        }
        if self.api_server_certificate.is_none() || self.api_server_key.is_none() {
            problems.push("serving certificate and key must be set".to_string());
        }
        if self.service_account_public_key.is_none() {
            problems.push("service account public key must be set".to_string());
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
        let mut insert = |file: &str, content: &Option<String>| {
            if let Some(content) = content {
                config_files.insert(format!("{CONFIG_DIR}/pki/{file}"), content.clone());
            }
        };

        insert("apiserver.crt", &self.api_server_certificate);
        insert("apiserver.key", &self.api_server_key);
        insert("ca.crt", &self.common.kubernetes_ca_certificate);
        insert("front-proxy-ca.crt", &self.common.front_proxy_ca_certificate);
        insert("service-account.pub", &self.service_account_public_key);
        insert("kubelet-client.crt", &self.kubelet_client_certificate);
        insert("kubelet-client.key", &self.kubelet_client_key);
        insert("front-proxy-client.crt", &self.front_proxy_client_certificate);
        insert("front-proxy-client.key", &self.front_proxy_client_key);

        let mut args = vec![
            format!("--etcd-servers={}", self.etcd_servers.join(",")),
            format!("--tls-cert-file={CONFIG_DIR}/pki/apiserver.crt"),
            format!("--tls-private-key-file={CONFIG_DIR}/pki/apiserver.key"),
            format!("--client-ca-file={CONFIG_DIR}/pki/ca.crt"),
            format!("--service-account-key-file={CONFIG_DIR}/pki/service-account.pub"),
            "--service-account-issuer=https://kubernetes.default.svc".to_string(),
            "--authorization-mode=RBAC".to_string(),
            "--allow-privileged=true".to_string(),
            format!("--secure-port={}", self.secure_port.unwrap_or(6443)),
        ];

        if let Some(address) = &self.bind_address {
            args.push(format!("--bind-address={address}"));
        }
        if let Some(address) = &self.advertise_address {
            args.push(format!("--advertise-address={address}"));
        }
        if let Some(cidr) = &self.service_cidr {
            args.push(format!("--service-cluster-ip-range={cidr}"));
        }
        if self.kubelet_client_certificate.is_some() {
            args.push(format!(
                "--kubelet-client-certificate={CONFIG_DIR}/pki/kubelet-client.crt"
            ));
            args.push(format!(
                "--kubelet-client-key={CONFIG_DIR}/pki/kubelet-client.key"
            ));
        }
        if self.front_proxy_client_certificate.is_some() {
            args.push(format!(
                "--proxy-client-cert-file={CONFIG_DIR}/pki/front-proxy-client.crt"
            ));
            args.push(format!(
                "--proxy-client-key-file={CONFIG_DIR}/pki/front-proxy-client.key"
            ));
            args.push(format!(
                "--requestheader-client-ca-file={CONFIG_DIR}/pki/front-proxy-ca.crt"
            ));
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
                    name: "kube-apiserver".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> KubeApiServer {
        KubeApiServer {
            common: Common {
                kubernetes_ca_certificate: Some("ca-pem".to_string()),
                ..Default::default()
            },
            etcd_servers: vec!["https://10.0.0.11:2379".to_string()],
            api_server_certificate: Some("cert".to_string()),
            api_server_key: Some("key".to_string()),
            service_account_public_key: Some("sa-pub".to_string()),
            secure_port: Some(6443),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_etcd_servers_rejected() {
        let mut api_server = configured();
        api_server.etcd_servers.clear();

        assert!(
            api_server
                .validate()
                .iter()
                .any(|p| p.contains("etcd server"))
        );
    }

    #[test]
    fn test_container_owns_pki_files() {
        let container = configured().to_host_configured_container().unwrap();

        assert_eq!(
            container
                .config_files
                .get("/etc/kubernetes/kube-apiserver/pki/ca.crt")
                .map(String::as_str),
            Some("ca-pem")
        );
        assert!(
            container
                .config_files
                .contains_key("/etc/kubernetes/kube-apiserver/pki/apiserver.key")
        );
    }

    #[test]
    fn test_args_reference_mounted_paths() {
        let container = configured().to_host_configured_container().unwrap();
        let config = &container.container.config;

        assert_eq!(config.name, "kube-apiserver");
        assert_eq!(config.network_mode.as_deref(), Some("host"));
        assert!(
            config
                .args
                .contains(&"--etcd-servers=https://10.0.0.11:2379".to_string())
        );
        assert!(config.args.contains(
            &"--tls-cert-file=/etc/kubernetes/kube-apiserver/pki/apiserver.crt".to_string()
        ));
        assert_eq!(config.mounts[0].source, "/etc/kubernetes/kube-apiserver");
    }
}
