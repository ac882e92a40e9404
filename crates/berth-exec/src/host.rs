//! Host placement descriptor
//!
//! A `Host` names where a container lives and how to reach it. Equality
//! is structural: any change to the descriptor is a placement change.

use serde::{Deserialize, Serialize};

use crate::keys::KeySource;

/// Where a container is placed and how the transport reaches it.
///
/// An empty descriptor means the local machine; with `ssh` set, the host
/// is reached over SSH.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Host {
    /// SSH connection settings; absent for local deployments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshConfig>,
}

impl Host {
    /// Whether this host is the local machine
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.ssh.is_none()
    }

    /// Check the descriptor is well-formed, returning all problems found
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if let Some(ssh) = &self.ssh {
            if ssh.address.is_empty() {
                problems.push("ssh address must not be empty".to_string());
            }
            if ssh.user.is_empty() {
                problems.push("ssh user must not be empty".to_string());
            }
        }

        problems
    }
}

/// SSH connection settings for a host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SshConfig {
    /// IP address or hostname to connect to
    pub address: String,
    /// Port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username (default root)
    #[serde(default = "default_user")]
    pub user: String,
    /// Path to SSH private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,
    /// Environment variable holding a base64-encoded private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_env: Option<String>,
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "root".to_string()
}

impl SshConfig {
    /// Create connection settings for an address with defaults
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: default_port(),
            user: default_user(),
            private_key_path: None,
            private_key_env: None,
        }
    }

    /// Key resolution strategy for these settings
    ///
    /// An explicit path wins over an environment key; with neither set,
    /// the SSH agent is used.
    #[must_use]
    pub fn key_source(&self) -> KeySource {
        if let Some(path) = &self.private_key_path {
            KeySource::Path(path.into())
        } else if let Some(var) = &self.private_key_env {
            KeySource::Env(var.clone())
        } else {
            KeySource::Agent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_host_is_local() {
        assert!(Host::default().is_local());
        assert!(Host::default().validate().is_empty());
    }

    #[test]
    fn test_empty_address_rejected() {
        let host = Host {
            ssh: Some(SshConfig::new("")),
        };
        assert!(!host.validate().is_empty());
    }

    #[test]
    fn test_equality_is_structural() {
        let a = Host {
            ssh: Some(SshConfig::new("10.0.0.1")),
        };
        let mut b = a.clone();
        assert_eq!(a, b);

        b.ssh.as_mut().unwrap().user = "deploy".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_source_precedence() {
        let mut ssh = SshConfig::new("10.0.0.1");
        assert!(matches!(ssh.key_source(), KeySource::Agent));

        ssh.private_key_env = Some("BERTH_SSH_KEY".to_string());
        assert!(matches!(ssh.key_source(), KeySource::Env(_)));

        ssh.private_key_path = Some("/etc/berth/id_ed25519".to_string());
        assert!(matches!(ssh.key_source(), KeySource::Path(_)));
    }
}
