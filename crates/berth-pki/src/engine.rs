//! Batch realization of certificate requests
//!
//! Requests form a DAG through their `ca` edges. Realization
//! topologically sorts the batch (self-signed roots first), merges each
//! request's inheritance chain into its target and signs whatever is not
//! already resolved.

use std::collections::BTreeMap;
use std::net::IpAddr;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType, string::Ia5String,
};
use tracing::{debug, info};

use crate::certificate::{Certificate, KeyUsage};
use crate::error::PkiError;

const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// One certificate to resolve
///
/// The chain is merged left to right into the target; callers place the
/// target template last so its explicit settings win. `ca: None` makes
/// the certificate a self-signed root.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    /// Name of the resolved target in the output map
    pub name: String,
    /// Name of the request issuing this certificate
    pub ca: Option<String>,
    /// Inheritance chain, least specific first
    pub chain: Vec<Certificate>,
}

/// Realize a batch of certificate requests
///
/// Requests whose merged target already carries key and certificate
/// material are passed through untouched, so rerunning a partially
/// completed generation only fills in what is missing. A cycle among
/// the `ca` edges or a reference to a CA without key material is
/// rejected.
pub fn build_and_generate(
    requests: Vec<CertificateRequest>,
) -> Result<BTreeMap<String, Certificate>, PkiError> {
    let mut remaining: BTreeMap<String, CertificateRequest> = BTreeMap::new();
    for request in requests {
        let name = request.name.clone();
        if remaining.insert(name.clone(), request).is_some() {
            return Err(PkiError::DuplicateRequest(name));
        }
    }

    for request in remaining.values() {
        if let Some(ca) = &request.ca
            && !remaining.contains_key(ca)
        {
            return Err(PkiError::UnresolvedCa(ca.clone()));
        }
    }

    let mut resolved: BTreeMap<String, Certificate> = BTreeMap::new();

    while !remaining.is_empty() {
        let ready: Vec<String> = remaining
            .values()
            .filter(|request| {
                request
                    .ca
                    .as_ref()
                    .is_none_or(|ca| resolved.contains_key(ca))
            })
            .map(|request| request.name.clone())
            .collect();

        if ready.is_empty() {
            return Err(PkiError::CycleInCaGraph(
                remaining.keys().cloned().collect(),
            ));
        }

        for name in ready {
            let Some(request) = remaining.remove(&name) else {
                continue;
            };

            let target = request
                .chain
                .iter()
                .fold(Certificate::default(), Certificate::merged_with);

            let target = if target.is_resolved() {
                debug!(certificate = %name, "already resolved, skipping");
                target
            } else {
                let ca = match &request.ca {
                    None => None,
                    Some(ca_name) => {
                        let ca = resolved
                            .get(ca_name)
                            .filter(|ca| ca.is_resolved())
                            .ok_or_else(|| PkiError::UnresolvedCa(ca_name.clone()))?;
                        Some(ca)
                    }
                };

                issue(&name, target, ca)?
            };

            resolved.insert(name, target);
        }
    }

    Ok(resolved)
}

/// Sign one merged target, self-signing when no CA is given
fn issue(name: &str, mut target: Certificate, ca: Option<&Certificate>) -> Result<Certificate, PkiError> {
    let key_pair = KeyPair::generate().map_err(|e| generation(name, e))?;
    let params = params_for(name, &target)?;

    match ca {
        None => {
            let cert = params.self_signed(&key_pair).map_err(|e| generation(name, e))?;
            let pem = cert.pem();
            target.ca_certificate = Some(pem.clone());
            target.certificate = Some(pem);
        }
        Some(ca) => {
            // The caller guarantees the CA is resolved.
            let (Some(ca_pem), Some(ca_key_pem)) = (&ca.certificate, &ca.private_key) else {
                return Err(PkiError::UnresolvedCa(name.to_string()));
            };

            let ca_key = KeyPair::from_pem(ca_key_pem).map_err(|e| generation(name, e))?;
            let issuer =
                Issuer::from_ca_cert_pem(ca_pem, &ca_key).map_err(|e| generation(name, e))?;

            let cert = params
                .signed_by(&key_pair, &issuer)
                .map_err(|e| generation(name, e))?;

            target.certificate = Some(cert.pem());
            target.ca_certificate = Some(issuing_chain(ca_pem, ca.ca_certificate.as_deref()));
        }
    }

    target.private_key = Some(key_pair.serialize_pem());

    info!(certificate = %name, self_signed = ca.is_none(), "certificate issued");

    Ok(target)
}

/// The issuer's certificate followed by its own chain when that adds a
/// link (a self-signed issuer's chain is itself)
fn issuing_chain(ca_pem: &str, ca_chain: Option<&str>) -> String {
    match ca_chain {
        Some(parent) if parent != ca_pem => format!("{ca_pem}{parent}"),
        _ => ca_pem.to_string(),
    }
}

fn params_for(name: &str, target: &Certificate) -> Result<CertificateParams, PkiError> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    if let Some(cn) = &target.common_name {
        dn.push(DnType::CommonName, DnValue::Utf8String(cn.clone()));
    }
    if let Some(organization) = &target.organization {
        dn.push(
            DnType::OrganizationName,
            DnValue::Utf8String(organization.clone()),
        );
    }
    params.distinguished_name = dn;

    if target.is_ca == Some(true) {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    }

    match target.key_usage {
        Some(KeyUsage::Signing) => {
            params.key_usages = vec![
                KeyUsagePurpose::KeyCertSign,
                KeyUsagePurpose::CrlSign,
                KeyUsagePurpose::DigitalSignature,
            ];
        }
        Some(KeyUsage::Server) => {
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        }
        Some(KeyUsage::Client) => {
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        }
        None => {
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
        }
    }

    for dns in &target.dns_names {
        let san = Ia5String::try_from(dns.clone()).map_err(|_| PkiError::InvalidDnsName {
            name: name.to_string(),
            dns: dns.clone(),
        })?;
        params.subject_alt_names.push(SanType::DnsName(san));
    }
    for address in &target.ip_addresses {
        let parsed: IpAddr = address.parse().map_err(|_| PkiError::InvalidIpAddress {
            name: name.to_string(),
            address: address.clone(),
        })?;
        params.subject_alt_names.push(SanType::IpAddress(parsed));
    }

    let validity_days = i64::from(target.validity_days.unwrap_or(DEFAULT_VALIDITY_DAYS));
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::hours(1);
    params.not_after = now + time::Duration::days(validity_days);

    Ok(params)
}

fn generation(name: &str, error: impl std::fmt::Display) -> PkiError {
    PkiError::CertificateGeneration {
        name: name.to_string(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, ca: Option<&str>, chain: Vec<Certificate>) -> CertificateRequest {
        CertificateRequest {
            name: name.to_string(),
            ca: ca.map(ToString::to_string),
            chain,
        }
    }

    fn ca_template(cn: &str) -> Certificate {
        Certificate {
            common_name: Some(cn.to_string()),
            is_ca: Some(true),
            key_usage: Some(KeyUsage::Signing),
            ..Default::default()
        }
    }

    #[test]
    fn test_root_and_leaf_resolve_in_order() {
        let resolved = build_and_generate(vec![
            request(
                "leaf",
                Some("root"),
                vec![Certificate {
                    common_name: Some("client".to_string()),
                    key_usage: Some(KeyUsage::Client),
                    ..Default::default()
                }],
            ),
            request("root", None, vec![ca_template("test-root")]),
        ])
        .unwrap();

        assert!(resolved.get("root").unwrap().is_resolved());
        assert!(resolved.get("leaf").unwrap().is_resolved());

        // A self-signed root's chain is itself.
        let root = resolved.get("root").unwrap();
        assert_eq!(root.ca_certificate, root.certificate);

        // The leaf's chain is the root certificate.
        let leaf = resolved.get("leaf").unwrap();
        assert_eq!(leaf.ca_certificate, root.certificate);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let result = build_and_generate(vec![
            request("a", Some("b"), vec![ca_template("a")]),
            request("b", Some("a"), vec![ca_template("b")]),
        ]);

        assert!(matches!(result, Err(PkiError::CycleInCaGraph(_))));
    }

    #[test]
    fn test_unknown_ca_is_rejected() {
        let result = build_and_generate(vec![request(
            "leaf",
            Some("missing"),
            vec![Certificate::default()],
        )]);

        assert!(matches!(result, Err(PkiError::UnresolvedCa(_))));
    }

    #[test]
    fn test_garbage_ca_material_fails_at_signing() {
        let pre_resolved = Certificate {
            certificate: Some("not really a cert".to_string()),
            private_key: Some("not really a key".to_string()),
            ..Default::default()
        };

        let result = build_and_generate(vec![
            request("root", None, vec![pre_resolved]),
            request("leaf", Some("root"), vec![Certificate::default()]),
        ]);

        assert!(matches!(
            result,
            Err(PkiError::CertificateGeneration { .. })
        ));
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let result = build_and_generate(vec![
            request("a", None, vec![ca_template("a")]),
            request("a", None, vec![ca_template("a")]),
        ]);

        assert!(matches!(result, Err(PkiError::DuplicateRequest(_))));
    }

    #[test]
    fn test_resolved_target_is_skipped() {
        let first = build_and_generate(vec![request("root", None, vec![ca_template("root")])])
            .unwrap();
        let root = first.get("root").unwrap().clone();

        // Rerunning with the resolved output placed last performs no signing.
        let second = build_and_generate(vec![request(
            "root",
            None,
            vec![ca_template("root"), root.clone()],
        )])
        .unwrap();

        assert_eq!(second.get("root").unwrap(), &root);
    }

    #[test]
    fn test_invalid_ip_address_rejected() {
        let result = build_and_generate(vec![request(
            "server",
            None,
            vec![Certificate {
                common_name: Some("server".to_string()),
                ip_addresses: vec!["not-an-ip".to_string()],
                ..Default::default()
            }],
        )]);

        assert!(matches!(result, Err(PkiError::InvalidIpAddress { .. })));
    }
}
