//! Client kubeconfig rendering
//!
//! Control-plane clients authenticate with certificates; the rendered
//! kubeconfig embeds all material base64-encoded so the file is
//! self-contained on the host.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::error::ControlplaneError;

/// Settings for a client kubeconfig
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Kubeconfig {
    /// API server URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// PEM of the CA the server's certificate chains to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,
    /// PEM client certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,
    /// PEM client key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
}

impl Kubeconfig {
    /// Fill unset fields from propagated cluster-level settings
    pub(crate) fn propagate(&mut self, server: Option<&str>, ca_certificate: Option<&str>) {
        if self.server.is_none() {
            self.server = server.map(ToString::to_string);
        }
        if self.ca_certificate.is_none() {
            self.ca_certificate = ca_certificate.map(ToString::to_string);
        }
    }

    /// Check all required fields are present
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.server.is_none() {
            problems.push("kubeconfig server must be set".to_string());
        }
        if self.ca_certificate.is_none() {
            problems.push("kubeconfig CA certificate must be set".to_string());
        }
        if self.client_certificate.is_none() {
            problems.push("kubeconfig client certificate must be set".to_string());
        }
        if self.client_key.is_none() {
            problems.push("kubeconfig client key must be set".to_string());
        }

        problems
    }

    /// Render the kubeconfig file content
    pub fn render(&self) -> Result<String, ControlplaneError> {
        let document = KubeconfigFile {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: "default".to_string(),
                cluster: Cluster {
                    server: self.server.clone().unwrap_or_default(),
                    certificate_authority_data: encode(self.ca_certificate.as_deref()),
                },
            }],
            users: vec![NamedUser {
                name: "default".to_string(),
                user: User {
                    client_certificate_data: encode(self.client_certificate.as_deref()),
                    client_key_data: encode(self.client_key.as_deref()),
                },
            }],
            contexts: vec![NamedContext {
                name: "default".to_string(),
                context: Context {
                    cluster: "default".to_string(),
                    user: "default".to_string(),
                },
            }],
            current_context: "default".to_string(),
        };

        serde_yaml::to_string(&document).map_err(|e| ControlplaneError::Render {
            what: "kubeconfig".to_string(),
            reason: e.to_string(),
        })
    }
}

fn encode(pem: Option<&str>) -> String {
    BASE64.encode(pem.unwrap_or_default())
}

#[derive(Serialize)]
struct KubeconfigFile {
    #[serde(rename = "apiVersion")]
    api_version: String,
    kind: String,
    clusters: Vec<NamedCluster>,
    users: Vec<NamedUser>,
    contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    current_context: String,
}

#[derive(Serialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Serialize)]
struct Cluster {
    server: String,
    #[serde(rename = "certificate-authority-data")]
    certificate_authority_data: String,
}

#[derive(Serialize)]
struct NamedUser {
    name: String,
    user: User,
}

#[derive(Serialize)]
struct User {
    #[serde(rename = "client-certificate-data")]
    client_certificate_data: String,
    #[serde(rename = "client-key-data")]
    client_key_data: String,
}

#[derive(Serialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Serialize)]
struct Context {
    cluster: String,
    user: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Kubeconfig {
        Kubeconfig {
            server: Some("https://10.0.0.10:6443".to_string()),
            ca_certificate: Some("ca".to_string()),
            client_certificate: Some("cert".to_string()),
            client_key: Some("key".to_string()),
        }
    }

    #[test]
    fn test_complete_kubeconfig_validates() {
        assert!(complete().validate().is_empty());
    }

    #[test]
    fn test_missing_fields_are_listed() {
        assert_eq!(Kubeconfig::default().validate().len(), 4);
    }

    #[test]
    fn test_render_embeds_material_base64() {
        let rendered = complete().render().unwrap();

        assert!(rendered.contains("server: https://10.0.0.10:6443"));
        assert!(rendered.contains("current-context: default"));
        assert!(rendered.contains(&BASE64.encode("ca")));
        assert!(rendered.contains(&BASE64.encode("cert")));
        // Raw PEM never appears in the file.
        assert!(!rendered.contains("client-certificate-data: cert"));
    }

    #[test]
    fn test_propagate_fills_only_unset_fields() {
        let mut kubeconfig = Kubeconfig {
            server: Some("https://explicit:6443".to_string()),
            ..Default::default()
        };

        kubeconfig.propagate(Some("https://propagated:6443"), Some("ca"));

        assert_eq!(kubeconfig.server.as_deref(), Some("https://explicit:6443"));
        assert_eq!(kubeconfig.ca_certificate.as_deref(), Some("ca"));
    }
}
