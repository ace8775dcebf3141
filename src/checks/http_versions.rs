// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - HTTP Version Detection
 * Detects negotiated HTTP/2 and advertised HTTP/3 support
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::types::{Finding, Severity};
use async_trait::async_trait;
use tracing::{debug, info};

pub struct HttpVersionsCheck;

/// Parse an Alt-Svc header and return the advertised h3 authority, if any.
/// Example: `h3=":443"; ma=86400, h3-29=":443"`
fn h3_alternative(alt_svc: &str) -> Option<String> {
    for entry in alt_svc.split(',') {
        let entry = entry.trim();
        let Some((proto, rest)) = entry.split_once('=') else {
            continue;
        };
        let proto = proto.trim();
        if proto == "h3" || proto.starts_with("h3-") {
            let authority = rest
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .trim_matches('"');
            return Some(authority.to_string());
        }
    }
    None
}

#[async_trait]
impl SecurityCheck for HttpVersionsCheck {
    fn id(&self) -> &'static str {
        "http_versions"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[HTTP Versions] Scanning: {}", ctx.target);
        let response = ctx.root().await?;

        let negotiated = response.http_version.clone();
        let h3 = response.header("alt-svc").and_then(h3_alternative);
        debug!(
            "[HTTP Versions] negotiated {} alt-svc h3: {:?}",
            negotiated, h3
        );

        let mut findings = Vec::new();
        let supports_h2 = negotiated == "HTTP/2" || negotiated == "HTTP/3";
        let supports_h3 = negotiated == "HTTP/3" || h3.is_some();

        if let Some(authority) = &h3 {
            findings.push(
                Finding::new(
                    Severity::Info,
                    "HTTP3_ADVERTISED",
                    "Server advertises HTTP/3 via Alt-Svc",
                )
                .with_evidence(format!("h3={}", authority)),
            );
        }

        match (supports_h2, supports_h3) {
            (true, true) => Ok(CheckOutcome::pass(100).with_findings(findings)),
            (true, false) => {
                findings.push(Finding::new(
                    Severity::Info,
                    "HTTP3_NOT_ADVERTISED",
                    "No HTTP/3 alternative service advertised",
                ));
                Ok(CheckOutcome::pass(85).with_findings(findings))
            }
            _ => {
                findings.push(
                    Finding::new(
                        Severity::Low,
                        "HTTP1_ONLY",
                        "Connection negotiated HTTP/1.1 only; modern multiplexed \
                         protocols are unavailable",
                    )
                    .with_evidence(negotiated),
                );
                Ok(CheckOutcome::warn(50, findings))
            }
        }
    }
}
