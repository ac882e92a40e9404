//! Certificate templates and their merge semantics

use serde::{Deserialize, Serialize};

/// How a certificate's key may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    /// TLS server certificate
    Server,
    /// TLS client certificate
    Client,
    /// CA signing key
    Signing,
}

/// A certificate template and, once resolved, its PEM outputs
///
/// Every subject field is optional so templates compose: a request
/// merges an ordered chain of these into the final target, with the
/// target itself placed last so explicit settings override inherited
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Certificate {
    /// Subject common name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    /// Subject organization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// DNS subject alternative names; unioned across the chain
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
    /// IP subject alternative names; unioned across the chain
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<String>,
    /// Key usage profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_usage: Option<KeyUsage>,
    /// Validity window in days
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validity_days: Option<u32>,
    /// Whether this certificate is a CA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ca: Option<bool>,
    /// PEM-encoded certificate, set once resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// PEM-encoded private key, set once resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// PEM chain of the issuing CA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,
}

impl Certificate {
    /// A certificate is resolved once both PEM outputs are present
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.certificate.is_some() && self.private_key.is_some()
    }

    /// Merge an overlay into this template
    ///
    /// Non-empty overlay fields replace the accumulated value; the
    /// accumulating SAN lists are unioned preserving first appearance.
    #[must_use]
    pub fn merged_with(mut self, overlay: &Certificate) -> Certificate {
        if overlay.common_name.is_some() {
            self.common_name = overlay.common_name.clone();
        }
        if overlay.organization.is_some() {
            self.organization = overlay.organization.clone();
        }
        if overlay.key_usage.is_some() {
            self.key_usage = overlay.key_usage;
        }
        if overlay.validity_days.is_some() {
            self.validity_days = overlay.validity_days;
        }
        if overlay.is_ca.is_some() {
            self.is_ca = overlay.is_ca;
        }
        if overlay.certificate.is_some() {
            self.certificate = overlay.certificate.clone();
        }
        if overlay.private_key.is_some() {
            self.private_key = overlay.private_key.clone();
        }
        if overlay.ca_certificate.is_some() {
            self.ca_certificate = overlay.ca_certificate.clone();
        }

        for name in &overlay.dns_names {
            if !self.dns_names.contains(name) {
                self.dns_names.push(name.clone());
            }
        }
        for address in &overlay.ip_addresses {
            if !self.ip_addresses.contains(address) {
                self.ip_addresses.push(address.clone());
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_overlay_wins() {
        let merged = Certificate {
            common_name: Some("default".to_string()),
            validity_days: Some(365),
            ..Default::default()
        }
        .merged_with(&Certificate {
            common_name: Some("target".to_string()),
            ..Default::default()
        });

        assert_eq!(merged.common_name.as_deref(), Some("target"));
        assert_eq!(merged.validity_days, Some(365));
    }

    #[test]
    fn test_san_lists_are_unioned() {
        let merged = Certificate {
            dns_names: vec!["localhost".to_string(), "kubernetes".to_string()],
            ip_addresses: vec!["127.0.0.1".to_string()],
            ..Default::default()
        }
        .merged_with(&Certificate {
            dns_names: vec!["kubernetes".to_string(), "example.com".to_string()],
            ip_addresses: vec!["10.0.0.1".to_string()],
            ..Default::default()
        });

        assert_eq!(merged.dns_names, vec!["localhost", "kubernetes", "example.com"]);
        assert_eq!(merged.ip_addresses, vec!["127.0.0.1", "10.0.0.1"]);
    }

    #[test]
    fn test_resolution_requires_both_outputs() {
        let mut certificate = Certificate::default();
        assert!(!certificate.is_resolved());

        certificate.certificate = Some("cert".to_string());
        assert!(!certificate.is_resolved());

        certificate.private_key = Some("key".to_string());
        assert!(certificate.is_resolved());
    }
}
