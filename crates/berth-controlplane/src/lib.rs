//! berth-controlplane: Static Kubernetes control plane in containers
//!
//! Turns a control-plane configuration into the desired state of three
//! host-configured containers (kube-apiserver, kube-controller-manager,
//! kube-scheduler). Settings shared by the components are defined once
//! and propagated down; per-component settings win over propagated ones.

pub mod error;
pub mod kube_apiserver;
pub mod kube_controller_manager;
pub mod kube_scheduler;
pub mod kubeconfig;

pub use error::ControlplaneError;
pub use kube_apiserver::KubeApiServer;
pub use kube_controller_manager::KubeControllerManager;
pub use kube_scheduler::KubeScheduler;
pub use kubeconfig::Kubeconfig;

use serde::{Deserialize, Serialize};

use berth_core::{Containers, ContainersState, Host, SshConfig};

/// Fields shared by all control-plane components
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Common {
    /// Image override for every component
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// PEM of the cluster CA certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_ca_certificate: Option<String>,
    /// PEM of the front proxy CA certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_proxy_ca_certificate: Option<String>,
}

impl Common {
    /// Whether every field is unset
    #[must_use]
    pub fn is_unset(&self) -> bool {
        *self == Common::default()
    }

    /// Fill unset fields from another `Common`
    fn propagate(&mut self, from: &Common) {
        if self.image.is_none() {
            self.image = from.image.clone();
        }
        if self.kubernetes_ca_certificate.is_none() {
            self.kubernetes_ca_certificate = from.kubernetes_ca_certificate.clone();
        }
        if self.front_proxy_ca_certificate.is_none() {
            self.front_proxy_ca_certificate = from.front_proxy_ca_certificate.clone();
        }
    }
}

/// Kubernetes control-plane configuration and persisted state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Controlplane {
    /// Defaults shared by all components
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common: Option<Common>,
    /// SSH settings propagated into every component host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshConfig>,
    /// Address the API server is reachable on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_server_address: Option<String>,
    /// Port the API server is reachable on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_server_port: Option<u16>,

    pub kube_api_server: KubeApiServer,
    pub kube_controller_manager: KubeControllerManager,
    pub kube_scheduler: KubeScheduler,

    /// Containers state persisted from the last run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ContainersState>,
}

impl Controlplane {
    /// Components with all shared settings propagated down
    fn built_components(&self) -> (KubeApiServer, KubeControllerManager, KubeScheduler) {
        let common = self.common.clone().unwrap_or_default();
        let server = self
            .api_server_address
            .as_ref()
            .zip(self.api_server_port)
            .map(|(address, port)| format!("https://{address}:{port}"));

        let mut api_server = self.kube_api_server.clone();
        api_server.common.propagate(&common);
        propagate_host(&mut api_server.host, self.ssh.as_ref());
        if api_server.bind_address.is_none() {
            api_server.bind_address = self.api_server_address.clone();
        }
        if api_server.advertise_address.is_none() {
            api_server.advertise_address = self.api_server_address.clone();
        }
        if api_server.secure_port.is_none() {
            api_server.secure_port = self.api_server_port;
        }

        let mut controller_manager = self.kube_controller_manager.clone();
        controller_manager.common.propagate(&common);
        propagate_host(&mut controller_manager.host, self.ssh.as_ref());
        controller_manager
            .kubeconfig
            .propagate(server.as_deref(), common.kubernetes_ca_certificate.as_deref());

        let mut scheduler = self.kube_scheduler.clone();
        scheduler.common.propagate(&common);
        propagate_host(&mut scheduler.host, self.ssh.as_ref());
        scheduler
            .kubeconfig
            .propagate(server.as_deref(), common.kubernetes_ca_certificate.as_deref());

        (api_server, controller_manager, scheduler)
    }

    /// Check the configuration, listing every problem found
    pub fn validate(&self) -> Result<(), ControlplaneError> {
        let (api_server, controller_manager, scheduler) = self.built_components();

        let mut problems = Vec::new();
        for problem in api_server.validate() {
            problems.push(format!("kube-apiserver: {problem}"));
        }
        for problem in controller_manager.validate() {
            problems.push(format!("kube-controller-manager: {problem}"));
        }
        for problem in scheduler.validate() {
            problems.push(format!("kube-scheduler: {problem}"));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ControlplaneError::Validation(problems))
        }
    }

    /// Desired and previous state as a containers document
    ///
    /// The result feeds the reconciliation engine; after a run, the
    /// exported previous state goes back into `state`.
    pub fn to_containers(&self) -> Result<Containers, ControlplaneError> {
        self.validate()?;

        let (api_server, controller_manager, scheduler) = self.built_components();

        let mut desired = ContainersState::default();
        desired.insert("kube-apiserver", api_server.to_host_configured_container()?);
        desired.insert(
            "kube-controller-manager",
            controller_manager.to_host_configured_container()?,
        );
        desired.insert("kube-scheduler", scheduler.to_host_configured_container()?);

        Ok(Containers {
            previous_state: self.state.clone(),
            desired_state: Some(desired),
        })
    }
}

fn propagate_host(host: &mut Option<Host>, ssh: Option<&SshConfig>) {
    if host.is_none() {
        *host = Some(Host {
            ssh: ssh.cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Controlplane {
        Controlplane {
            common: Some(Common {
                kubernetes_ca_certificate: Some("ca-pem".to_string()),
                ..Default::default()
            }),
            api_server_address: Some("10.0.0.10".to_string()),
            api_server_port: Some(6443),
            kube_api_server: KubeApiServer {
                etcd_servers: vec!["https://10.0.0.11:2379".to_string()],
                api_server_certificate: Some("cert".to_string()),
                api_server_key: Some("key".to_string()),
                service_account_public_key: Some("sa-pub".to_string()),
                ..Default::default()
            },
            kube_controller_manager: KubeControllerManager {
                kubeconfig: Kubeconfig {
                    client_certificate: Some("ccert".to_string()),
                    client_key: Some("ckey".to_string()),
                    ..Default::default()
                },
                service_account_private_key: Some("sa-key".to_string()),
                ..Default::default()
            },
            kube_scheduler: KubeScheduler {
                kubeconfig: Kubeconfig {
                    client_certificate: Some("ccert".to_string()),
                    client_key: Some("ckey".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_configuration_validates() {
        minimal().validate().unwrap();
    }

    #[test]
    fn test_desired_state_has_three_components() {
        let containers = minimal().to_containers().unwrap();
        let desired = containers.desired_state.unwrap();

        assert_eq!(
            desired.names(),
            vec![
                "kube-apiserver".to_string(),
                "kube-controller-manager".to_string(),
                "kube-scheduler".to_string(),
            ]
        );
        assert!(containers.previous_state.is_none());
    }

    #[test]
    fn test_kubeconfig_server_is_propagated() {
        let (_, controller_manager, scheduler) = minimal().built_components();

        assert_eq!(
            controller_manager.kubeconfig.server.as_deref(),
            Some("https://10.0.0.10:6443")
        );
        assert_eq!(
            scheduler.kubeconfig.ca_certificate.as_deref(),
            Some("ca-pem")
        );
    }

    #[test]
    fn test_component_setting_wins_over_propagated() {
        let mut controlplane = minimal();
        controlplane.kube_scheduler.kubeconfig.server = Some("https://other:6443".to_string());

        let (_, _, scheduler) = controlplane.built_components();
        assert_eq!(
            scheduler.kubeconfig.server.as_deref(),
            Some("https://other:6443")
        );
    }

    #[test]
    fn test_missing_inputs_are_reported_per_component() {
        let err = Controlplane::default().validate().unwrap_err();

        let ControlplaneError::Validation(problems) = err else {
            panic!("expected validation error");
        };
        assert!(problems.iter().any(|p| p.starts_with("kube-apiserver:")));
        assert!(
            problems
                .iter()
                .any(|p| p.starts_with("kube-controller-manager:"))
        );
        assert!(problems.iter().any(|p| p.starts_with("kube-scheduler:")));
    }
}
