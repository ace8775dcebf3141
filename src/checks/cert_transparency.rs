// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Certificate Transparency Check
 * Extracts embedded SCTs from the leaf certificate and requires at least
 * two independent CT logs
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::types::{Finding, Severity};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, info};
use x509_parser::prelude::*;

/// Known CT log operators, keyed by hex log id prefix. Regenerated from
/// the log_list snapshot at release build time; unknown ids still count
/// as distinct logs.
const KNOWN_LOG_OPERATORS: &[(&str, &str)] = &[
    ("a4b90990", "Google"),
    ("eec095ee", "Google"),
    ("4494652e", "Google"),
    ("db74affb", "Cloudflare"),
    ("55814f7c", "Cloudflare"),
    ("5ea773f9", "DigiCert"),
    ("c1164ae0", "DigiCert"),
    ("e2694bae", "Let's Encrypt"),
    ("41c8cab1", "Sectigo"),
    ("6f5376ac", "Sectigo"),
];

fn hex_prefix(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn operator_for(log_id: &[u8]) -> Option<&'static str> {
    let prefix = hex_prefix(log_id);
    KNOWN_LOG_OPERATORS
        .iter()
        .find(|(id, _)| *id == prefix)
        .map(|(_, operator)| *operator)
}

/// Hex log ids of the SCTs embedded in a leaf certificate in DER form
pub fn embedded_sct_log_ids(leaf_der: &[u8]) -> Result<Vec<String>, AuditError> {
    let (_, certificate) = X509Certificate::from_der(leaf_der).map_err(|e| {
        AuditError::Tls {
            host: String::new(),
            reason: format!("leaf certificate parse failed: {}", e),
        }
    })?;
    let mut log_ids = Vec::new();
    for extension in certificate.extensions() {
        if let ParsedExtension::SCT(scts) = extension.parsed_extension() {
            for sct in scts {
                log_ids.push(
                    sct.id
                        .key_id
                        .iter()
                        .map(|b| format!("{:02x}", b))
                        .collect::<String>(),
                );
            }
        }
    }
    Ok(log_ids)
}

pub struct CertTransparencyCheck;

impl CertTransparencyCheck {
    /// Raw TLS handshake to obtain the validated leaf certificate
    async fn fetch_leaf(&self, host: &str, port: u16) -> Result<Vec<u8>, AuditError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));

        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| AuditError::Connect {
                url: format!("{}:{}", host, port),
                reason: e.to_string(),
            })?;
        let server_name =
            ServerName::try_from(host.to_string()).map_err(|e| AuditError::Tls {
                host: host.to_string(),
                reason: format!("invalid server name: {}", e),
            })?;
        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| AuditError::Tls {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        let (_, connection) = stream.get_ref();
        let leaf = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| AuditError::Tls {
                host: host.to_string(),
                reason: "peer presented no certificate".into(),
            })?;
        Ok(leaf.as_ref().to_vec())
    }
}

#[async_trait]
impl SecurityCheck for CertTransparencyCheck {
    fn id(&self) -> &'static str {
        "cert_transparency"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[CT] Scanning: {}", ctx.host);
        if ctx.target.scheme() != "https" {
            return Ok(CheckOutcome::fail(
                0,
                vec![Finding::new(
                    Severity::High,
                    "CT_NO_TLS",
                    "Certificate transparency requires an HTTPS target",
                )],
            ));
        }
        let port = ctx.target.port_or_known_default().unwrap_or(443);

        let leaf = tokio::select! {
            leaf = self.fetch_leaf(&ctx.host, port) => leaf?,
            _ = ctx.cancel.cancelled() => return Err(AuditError::Cancelled),
        };
        let log_ids = embedded_sct_log_ids(&leaf)?;
        debug!("[CT] {} embedded SCTs for {}", log_ids.len(), ctx.host);

        if log_ids.is_empty() {
            return Ok(CheckOutcome::warn(
                30,
                vec![Finding::new(
                    Severity::Medium,
                    "CT_NO_EMBEDDED_SCTS",
                    "Leaf certificate carries no embedded SCTs; delivery via the \
                     TLS extension or stapled OCSP was not observed",
                )],
            ));
        }

        let distinct: BTreeSet<&String> = log_ids.iter().collect();
        let operators: BTreeSet<String> = distinct
            .iter()
            .map(|id_hex| {
                let bytes: Vec<u8> = (0..id_hex.len())
                    .step_by(2)
                    .filter_map(|i| u8::from_str_radix(&id_hex[i..i + 2], 16).ok())
                    .collect();
                operator_for(&bytes)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| format!("log:{}", &id_hex[..8]))
            })
            .collect();

        let evidence = operators.iter().cloned().collect::<Vec<_>>().join(", ");
        if distinct.len() >= 2 {
            Ok(CheckOutcome::pass(100).with_findings(vec![Finding::new(
                Severity::Info,
                "CT_LOGS_PRESENT",
                format!("{} SCTs from {} distinct logs", log_ids.len(), distinct.len()),
            )
            .with_evidence(evidence)]))
        } else {
            Ok(CheckOutcome::warn(
                50,
                vec![Finding::new(
                    Severity::Medium,
                    "CT_SINGLE_LOG",
                    "Certificate is logged in fewer than two independent CT logs",
                )
                .with_evidence(evidence)],
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_prefix_formats_first_four_bytes() {
        assert_eq!(hex_prefix(&[0xa4, 0xb9, 0x09, 0x90, 0xff]), "a4b90990");
    }

    #[test]
    fn known_operator_lookup() {
        assert_eq!(operator_for(&[0xa4, 0xb9, 0x09, 0x90]), Some("Google"));
        assert_eq!(operator_for(&[0x00, 0x11, 0x22, 0x33]), None);
    }

    #[test]
    fn garbage_der_is_rejected() {
        assert!(embedded_sct_log_ids(&[0x00, 0x01, 0x02]).is_err());
    }
}
