// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - TLS Baseline Check
 * HTTPS enforcement: scheme, certificate validity, HTTP-to-HTTPS redirect
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::types::{CheckCategory, Finding, Severity};
use async_trait::async_trait;
use tracing::{debug, info};

pub struct TlsBaselineCheck;

#[async_trait]
impl SecurityCheck for TlsBaselineCheck {
    fn id(&self) -> &'static str {
        "tls_baseline"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[TLS Baseline] Scanning: {}", ctx.target);
        let mut findings = Vec::new();

        if ctx.target.scheme() != "https" {
            findings.push(
                Finding::new(
                    Severity::Critical,
                    "NO_HTTPS",
                    "Audit target is served over plain HTTP",
                )
                .with_evidence(ctx.target.to_string()),
            );
            return Ok(CheckOutcome::fail(0, findings));
        }

        // The root fetch already performed full certificate validation; a
        // TLS failure would have surfaced as an error before this point.
        let response = ctx.root().await?;
        if !response.final_url.starts_with("https://") {
            findings.push(
                Finding::new(
                    Severity::High,
                    "HTTPS_DOWNGRADE",
                    "HTTPS request was redirected to a plain-HTTP location",
                )
                .with_evidence(response.final_url.clone()),
            );
            return Ok(CheckOutcome::fail(10, findings));
        }

        // Probe whether plain HTTP is upgraded. Per-attempt only; a closed
        // port 80 is a perfectly good answer.
        let mut insecure = ctx.target.clone();
        let _ = insecure.set_scheme("http");
        let policy = ctx
            .policy(CheckCategory::Tls)
            .no_redirects()
            .single_attempt();
        match ctx.transport.get(insecure.as_str(), &policy).await {
            Ok(http_response) => {
                let location = http_response.header("location").unwrap_or("");
                let redirects_to_https = (300..400).contains(&http_response.status_code)
                    && location.starts_with("https://");
                if !redirects_to_https {
                    findings.push(
                        Finding::new(
                            Severity::High,
                            "HTTP_NOT_REDIRECTED",
                            "Plain-HTTP endpoint serves content without upgrading to HTTPS",
                        )
                        .with_evidence(format!(
                            "{} -> {} {}",
                            insecure, http_response.status_code, location
                        )),
                    );
                    return Ok(CheckOutcome::warn(60, findings));
                }
            }
            Err(err) => {
                // Unreachable port 80 means no cleartext surface at all
                debug!("[TLS Baseline] http probe failed (acceptable): {}", err);
            }
        }

        Ok(CheckOutcome::pass(100).with_findings(findings))
    }
}
