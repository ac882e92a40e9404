//! Kubernetes control-plane PKI
//!
//! The fixed certificate graph recommended by the Kubernetes TLS setup
//! guide: a cluster CA and a front-proxy CA, with the control-plane
//! client and serving certificates hanging off them.

use serde::{Deserialize, Serialize};

use crate::certificate::{Certificate, KeyUsage};
use crate::engine::{CertificateRequest, build_and_generate};
use crate::error::PkiError;

/// Default CN for the Kubernetes CA certificate
pub const KUBERNETES_CA_CN: &str = "kubernetes-ca";

/// Default CN for the Kubernetes front proxy CA certificate
pub const KUBERNETES_FRONT_PROXY_CA_CN: &str = "kubernetes-front-proxy-ca";

const ROOT_CA: &str = "root-ca";
const API_SERVER_SERVER: &str = "kube-apiserver-server";
const API_SERVER_KUBELET_CLIENT: &str = "kube-apiserver-kubelet-client";
const API_SERVER_FRONT_PROXY_CLIENT: &str = "kube-apiserver-front-proxy-client";
const ADMIN: &str = "admin";
const CONTROLLER_MANAGER: &str = "kube-controller-manager";
const SCHEDULER: &str = "kube-scheduler";
const SERVICE_ACCOUNT: &str = "service-account";

/// Kubernetes PKI settings and generated material
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Kubernetes {
    /// Defaults applied to every Kubernetes certificate
    #[serde(flatten)]
    pub certificate: Certificate,

    /// Cluster CA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<Certificate>,

    /// Front proxy CA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_proxy_ca: Option<Certificate>,

    /// kube-apiserver certificates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_api_server: Option<KubeApiServer>,

    /// kubernetes-admin client certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_certificate: Option<Certificate>,

    /// kube-controller-manager client certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_controller_manager_certificate: Option<Certificate>,

    /// kube-scheduler client certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_scheduler_certificate: Option<Certificate>,

    /// Service account token signing keypair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_certificate: Option<Certificate>,
}

/// kube-apiserver certificate settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubeApiServer {
    /// Defaults applied to every kube-apiserver certificate
    #[serde(flatten)]
    pub certificate: Certificate,

    /// Extra DNS names for the serving certificate
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_names: Vec<String>,

    /// Extra IP addresses for the serving certificate
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub server_ips: Vec<String>,

    /// Serving certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_certificate: Option<Certificate>,

    /// Client certificate for talking to kubelets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubelet_certificate: Option<Certificate>,

    /// Front proxy client certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_proxy_client_certificate: Option<Certificate>,
}

impl Kubernetes {
    /// Generate the full control-plane PKI
    ///
    /// Both CAs are signed by `root_ca` when given and self-signed
    /// otherwise. Already-resolved certificates are left untouched, so
    /// rerunning regenerates only what is missing.
    pub fn generate(
        &mut self,
        root_ca: Option<&Certificate>,
        defaults: &Certificate,
    ) -> Result<(), PkiError> {
        let resolved = build_and_generate(self.requests(root_ca, defaults))?;

        self.ca = resolved.get(KUBERNETES_CA_CN).cloned();
        self.front_proxy_ca = resolved.get(KUBERNETES_FRONT_PROXY_CA_CN).cloned();
        self.admin_certificate = resolved.get(ADMIN).cloned();
        self.kube_controller_manager_certificate = resolved.get(CONTROLLER_MANAGER).cloned();
        self.kube_scheduler_certificate = resolved.get(SCHEDULER).cloned();
        self.service_account_certificate = resolved.get(SERVICE_ACCOUNT).cloned();

        let api_server = self.kube_api_server.get_or_insert_with(KubeApiServer::default);
        api_server.server_certificate = resolved.get(API_SERVER_SERVER).cloned();
        api_server.kubelet_certificate = resolved.get(API_SERVER_KUBELET_CLIENT).cloned();
        api_server.front_proxy_client_certificate =
            resolved.get(API_SERVER_FRONT_PROXY_CLIENT).cloned();

        Ok(())
    }

    fn requests(
        &self,
        root_ca: Option<&Certificate>,
        defaults: &Certificate,
    ) -> Vec<CertificateRequest> {
        let api_server = self.kube_api_server.clone().unwrap_or_default();
        let ca_parent = root_ca.map(|_| ROOT_CA.to_string());

        let mut requests = Vec::new();

        if let Some(root) = root_ca {
            requests.push(CertificateRequest {
                name: ROOT_CA.to_string(),
                ca: None,
                chain: vec![ca_certificate("root-ca"), root.clone()],
            });
        }

        requests.push(CertificateRequest {
            name: KUBERNETES_CA_CN.to_string(),
            ca: ca_parent.clone(),
            chain: vec![
                defaults.clone(),
                self.certificate.clone(),
                ca_certificate(KUBERNETES_CA_CN),
                self.ca.clone().unwrap_or_default(),
            ],
        });

        requests.push(CertificateRequest {
            name: KUBERNETES_FRONT_PROXY_CA_CN.to_string(),
            ca: ca_parent,
            chain: vec![
                defaults.clone(),
                self.certificate.clone(),
                ca_certificate(KUBERNETES_FRONT_PROXY_CA_CN),
                self.front_proxy_ca.clone().unwrap_or_default(),
            ],
        });

        requests.push(CertificateRequest {
            name: API_SERVER_SERVER.to_string(),
            ca: Some(KUBERNETES_CA_CN.to_string()),
            chain: vec![
                defaults.clone(),
                self.certificate.clone(),
                api_server.certificate.clone(),
                api_server_serving_certificate(&api_server),
                api_server.server_certificate.clone().unwrap_or_default(),
            ],
        });

        requests.push(CertificateRequest {
            name: API_SERVER_KUBELET_CLIENT.to_string(),
            ca: Some(KUBERNETES_CA_CN.to_string()),
            chain: vec![
                defaults.clone(),
                self.certificate.clone(),
                api_server.certificate.clone(),
                client_certificate("kube-apiserver-kubelet-client", Some("system:masters")),
                api_server.kubelet_certificate.clone().unwrap_or_default(),
            ],
        });

        requests.push(CertificateRequest {
            name: API_SERVER_FRONT_PROXY_CLIENT.to_string(),
            ca: Some(KUBERNETES_FRONT_PROXY_CA_CN.to_string()),
            chain: vec![
                defaults.clone(),
                self.certificate.clone(),
                api_server.certificate.clone(),
                client_certificate("front-proxy-client", None),
                api_server
                    .front_proxy_client_certificate
                    .clone()
                    .unwrap_or_default(),
            ],
        });

        requests.push(CertificateRequest {
            name: ADMIN.to_string(),
            ca: Some(KUBERNETES_CA_CN.to_string()),
            chain: vec![
                defaults.clone(),
                self.certificate.clone(),
                client_certificate("kubernetes-admin", Some("system:masters")),
                self.admin_certificate.clone().unwrap_or_default(),
            ],
        });

        requests.push(CertificateRequest {
            name: CONTROLLER_MANAGER.to_string(),
            ca: Some(KUBERNETES_CA_CN.to_string()),
            chain: vec![
                defaults.clone(),
                self.certificate.clone(),
                client_certificate("system:kube-controller-manager", None),
                self.kube_controller_manager_certificate
                    .clone()
                    .unwrap_or_default(),
            ],
        });

        requests.push(CertificateRequest {
            name: SCHEDULER.to_string(),
            ca: Some(KUBERNETES_CA_CN.to_string()),
            chain: vec![
                defaults.clone(),
                self.certificate.clone(),
                client_certificate("system:kube-scheduler", None),
                self.kube_scheduler_certificate.clone().unwrap_or_default(),
            ],
        });

        // The service account keypair carries no CN or SAN constraints.
        requests.push(CertificateRequest {
            name: SERVICE_ACCOUNT.to_string(),
            ca: Some(KUBERNETES_CA_CN.to_string()),
            chain: vec![
                defaults.clone(),
                self.certificate.clone(),
                self.service_account_certificate.clone().unwrap_or_default(),
            ],
        });

        requests
    }
}

fn ca_certificate(cn: &str) -> Certificate {
    Certificate {
        common_name: Some(cn.to_string()),
        is_ca: Some(true),
        key_usage: Some(KeyUsage::Signing),
        validity_days: Some(3650),
        ..Default::default()
    }
}

fn client_certificate(cn: &str, organization: Option<&str>) -> Certificate {
    Certificate {
        common_name: Some(cn.to_string()),
        organization: organization.map(ToString::to_string),
        key_usage: Some(KeyUsage::Client),
        ..Default::default()
    }
}

/// Serving certificate for kube-apiserver with the canonical SAN set,
/// extended by the user-supplied external names and server IPs
fn api_server_serving_certificate(api_server: &KubeApiServer) -> Certificate {
    let mut dns_names: Vec<String> = [
        "localhost",
        "kubernetes",
        "kubernetes.default",
        "kubernetes.default.svc",
        "kubernetes.default.svc.cluster",
        "kubernetes.default.svc.cluster.local",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    dns_names.extend(api_server.external_names.iter().cloned());

    let mut ip_addresses = vec!["127.0.0.1".to_string()];
    ip_addresses.extend(api_server.server_ips.iter().cloned());

    Certificate {
        common_name: Some("kube-apiserver".to_string()),
        key_usage: Some(KeyUsage::Server),
        dns_names,
        ip_addresses,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_graph_shape() {
        let kubernetes = Kubernetes::default();
        let requests = kubernetes.requests(None, &Certificate::default());

        // Two CAs and seven leaves.
        assert_eq!(requests.len(), 9);
        assert_eq!(
            requests.iter().filter(|r| r.ca.is_none()).count(),
            2,
            "both CAs self-sign without a root"
        );
    }

    #[test]
    fn test_root_ca_becomes_parent_of_both_cas() {
        let root = Certificate {
            certificate: Some("cert".to_string()),
            private_key: Some("key".to_string()),
            ..Default::default()
        };

        let kubernetes = Kubernetes::default();
        let requests = kubernetes.requests(Some(&root), &Certificate::default());

        assert_eq!(requests.len(), 10);
        for name in [KUBERNETES_CA_CN, KUBERNETES_FRONT_PROXY_CA_CN] {
            let request = requests.iter().find(|r| r.name == name).unwrap();
            assert_eq!(request.ca.as_deref(), Some(ROOT_CA));
        }
    }

    #[test]
    fn test_serving_certificate_san_set() {
        let api_server = KubeApiServer {
            external_names: vec!["k8s.example.com".to_string()],
            server_ips: vec!["10.0.0.10".to_string()],
            ..Default::default()
        };

        let template = api_server_serving_certificate(&api_server);

        assert!(template.dns_names.contains(&"localhost".to_string()));
        assert!(
            template
                .dns_names
                .contains(&"kubernetes.default.svc.cluster.local".to_string())
        );
        assert!(template.dns_names.contains(&"k8s.example.com".to_string()));
        assert!(template.ip_addresses.contains(&"127.0.0.1".to_string()));
        assert!(template.ip_addresses.contains(&"10.0.0.10".to_string()));
    }
}
