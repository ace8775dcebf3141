// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - DNS-over-HTTPS Support Check
 * Resolves the target's authoritative name servers and probes the
 * provider's RFC 8484 endpoint when one is known
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::types::{CheckCategory, Finding, Severity};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::op::{Message, MessageType, OpCode, Query};
use hickory_resolver::proto::rr::{Name, RecordType};
use hickory_resolver::TokioResolver;
use reqwest::Method;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// DNS providers with a public RFC 8484 endpoint, keyed by the name
/// server hostname suffix they operate under.
const DOH_PROVIDERS: &[(&str, &str, &str)] = &[
    ("ns.cloudflare.com", "Cloudflare", "https://cloudflare-dns.com/dns-query"),
    ("googledomains.com", "Google", "https://dns.google/dns-query"),
    ("google.com", "Google", "https://dns.google/dns-query"),
    ("nsone.net", "NS1", "https://dns1.p01.nsone.net/dns-query"),
    ("dns.he.net", "Hurricane Electric", "https://ordns.he.net/dns-query"),
    ("quad9.net", "Quad9", "https://dns.quad9.net/dns-query"),
];

/// Match a name server hostname against the known provider table
pub fn provider_for(ns_host: &str) -> Option<(&'static str, &'static str)> {
    let normalized = ns_host.trim_end_matches('.').to_ascii_lowercase();
    DOH_PROVIDERS
        .iter()
        .find(|(suffix, _, _)| {
            normalized == *suffix || normalized.ends_with(&format!(".{}", suffix))
        })
        .map(|(_, provider, endpoint)| (*provider, *endpoint))
}

/// RFC 8484 GET query: base64url-encoded wire-format A question, no padding
pub fn doh_query_param(domain: &str) -> Result<String, AuditError> {
    let name = Name::from_str(domain).map_err(|e| AuditError::InvalidTarget {
        reason: format!("{}: {}", domain, e),
    })?;
    let mut message = Message::new();
    message
        .set_id(0) // cache-friendly per RFC 8484 §4.1
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, RecordType::A));
    let wire = message
        .to_vec()
        .map_err(|e| AuditError::Internal(format!("dns message encode: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(wire))
}

pub struct DohSupportCheck;

impl DohSupportCheck {
    async fn name_servers(&self, host: &str) -> Vec<String> {
        let resolver = match TokioResolver::builder(TokioConnectionProvider::default()) {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!("[DOH] Resolver construction failed: {}", e);
                return Vec::new();
            }
        };
        // Walk up from the host until a zone answers; host itself is
        // usually a subdomain with no NS records of its own.
        let mut candidate = host.to_string();
        loop {
            if let Ok(response) = resolver.ns_lookup(&candidate).await {
                let servers: Vec<String> =
                    response.iter().map(|ns| ns.to_string()).collect();
                if !servers.is_empty() {
                    return servers;
                }
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => {
                    candidate = parent.to_string();
                }
                _ => return Vec::new(),
            }
        }
    }
}

#[async_trait]
impl SecurityCheck for DohSupportCheck {
    fn id(&self) -> &'static str {
        "doh_support"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[DOH] Scanning: {}", ctx.host);

        let servers = tokio::select! {
            servers = self.name_servers(&ctx.host) => servers,
            _ = ctx.cancel.cancelled() => return Err(AuditError::Cancelled),
        };
        if servers.is_empty() {
            return Ok(CheckOutcome::warn(
                40,
                vec![Finding::new(
                    Severity::Low,
                    "DOH_NS_UNRESOLVED",
                    "No authoritative name servers could be resolved for the target",
                )],
            ));
        }
        debug!("[DOH] {} name servers for {}", servers.len(), ctx.host);

        let matched = servers.iter().find_map(|ns| provider_for(ns));
        let (provider, endpoint) = match matched {
            Some(pair) => pair,
            None => {
                return Ok(CheckOutcome::warn(
                    60,
                    vec![Finding::new(
                        Severity::Info,
                        "DOH_PROVIDER_UNKNOWN",
                        "Authoritative DNS provider has no known public DoH endpoint",
                    )
                    .with_evidence(servers.join(", "))],
                ))
            }
        };

        let param = doh_query_param(&ctx.host)?;
        let url = format!("{}?dns={}", endpoint, param);
        let policy = ctx
            .policy(CheckCategory::Dns)
            .single_attempt()
            .no_redirects();
        let response = ctx
            .transport
            .fetch(
                Method::GET,
                &url,
                &[("accept", "application/dns-message")],
                None,
                &policy,
            )
            .await;

        match response {
            Ok(resp)
                if resp.is_success()
                    && resp
                        .header("content-type")
                        .is_some_and(|ct| ct.contains("application/dns-message")) =>
            {
                Ok(CheckOutcome::pass(100).with_findings(vec![Finding::new(
                    Severity::Info,
                    "DOH_SUPPORTED",
                    format!("{} serves the zone and answers RFC 8484 queries", provider),
                )
                .with_evidence(endpoint.to_string())]))
            }
            Ok(resp) => Ok(CheckOutcome::warn(
                70,
                vec![Finding::new(
                    Severity::Low,
                    "DOH_PROBE_UNEXPECTED",
                    format!(
                        "{} DoH endpoint answered with status {} instead of a \
                         dns-message response",
                        provider, resp.status_code
                    ),
                )],
            )),
            Err(e) => Ok(CheckOutcome::warn(
                70,
                vec![Finding::new(
                    Severity::Low,
                    "DOH_PROBE_FAILED",
                    format!("{} DoH endpoint probe failed: {}", provider, e),
                )],
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_suffix_matching() {
        assert_eq!(
            provider_for("ernest.ns.cloudflare.com."),
            Some(("Cloudflare", "https://cloudflare-dns.com/dns-query"))
        );
        assert_eq!(
            provider_for("NS1.GOOGLEDOMAINS.COM"),
            Some(("Google", "https://dns.google/dns-query"))
        );
        assert!(provider_for("ns1.example-dns.net").is_none());
    }

    #[test]
    fn suffix_match_requires_label_boundary() {
        assert!(provider_for("evilgoogle.com").is_none());
    }

    #[test]
    fn query_param_is_base64url() {
        let param = doh_query_param("example.com").unwrap();
        assert!(!param.is_empty());
        assert!(!param.contains('='));
        assert!(!param.contains('+'));
        assert!(!param.contains('/'));
        let wire = URL_SAFE_NO_PAD.decode(&param).unwrap();
        // id 0 per RFC 8484, one question
        assert_eq!(&wire[0..2], &[0, 0]);
        assert_eq!(&wire[4..6], &[0, 1]);
    }
}
