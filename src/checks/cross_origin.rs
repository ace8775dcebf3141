// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Cross-Origin Policy Checks
 * CORS probing, COOP/COEP/CORP isolation and Permissions-Policy analysis
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::types::{CheckCategory, Finding, Severity};
use async_trait::async_trait;
use tracing::{debug, info};

const PROBE_ORIGIN: &str = "https://audit-probe.aivedha.invalid";

pub struct CorsPolicyCheck;

#[async_trait]
impl SecurityCheck for CorsPolicyCheck {
    fn id(&self) -> &'static str {
        "cors_policy"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[CORS] Scanning: {}", ctx.target);
        let policy = ctx.policy(CheckCategory::Policy);
        let response = ctx
            .transport
            .get_with_headers(ctx.target.as_str(), &[("origin", PROBE_ORIGIN)], &policy)
            .await?;

        let allow_origin = response.header("access-control-allow-origin");
        let allow_credentials = response
            .header("access-control-allow-credentials")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let mut findings = Vec::new();
        match allow_origin {
            None => return Ok(CheckOutcome::pass(100)),
            Some("*") => {
                if allow_credentials {
                    // Browsers reject this combination, but it signals a
                    // misconfigured CORS layer worth reporting loudly
                    findings.push(Finding::new(
                        Severity::High,
                        "CORS_WILDCARD_WITH_CREDENTIALS",
                        "Access-Control-Allow-Origin: * combined with credentials",
                    ));
                    return Ok(CheckOutcome::fail(10, findings));
                }
                findings.push(Finding::new(
                    Severity::Low,
                    "CORS_WILDCARD",
                    "Resource is readable from any origin",
                ));
                return Ok(CheckOutcome::warn(70, findings));
            }
            Some(value) if value == PROBE_ORIGIN => {
                let severity = if allow_credentials {
                    Severity::Critical
                } else {
                    Severity::Medium
                };
                findings.push(
                    Finding::new(
                        severity,
                        "CORS_ORIGIN_REFLECTED",
                        if allow_credentials {
                            "Arbitrary origins are reflected with credentials allowed"
                        } else {
                            "Arbitrary origins are reflected into Access-Control-Allow-Origin"
                        },
                    )
                    .with_evidence(value.to_string()),
                );
                let score = if allow_credentials { 0 } else { 40 };
                return Ok(CheckOutcome::fail(score, findings));
            }
            Some(value) => {
                debug!("[CORS] fixed allow-origin: {}", value);
                return Ok(CheckOutcome::pass(95).with_findings(vec![Finding::new(
                    Severity::Info,
                    "CORS_FIXED_ORIGIN",
                    format!("Access-Control-Allow-Origin is pinned to {}", value),
                )]));
            }
        }
    }
}

pub struct CrossOriginIsolationCheck;

#[async_trait]
impl SecurityCheck for CrossOriginIsolationCheck {
    fn id(&self) -> &'static str {
        "cross_origin_isolation"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[Cross-Origin Isolation] Scanning: {}", ctx.target);
        let response = ctx.root().await?;
        let mut findings = Vec::new();
        let mut score: i32 = 100;

        match response.header("cross-origin-opener-policy") {
            Some(v) if v.trim().eq_ignore_ascii_case("same-origin") => {}
            Some(v) => {
                findings.push(
                    Finding::new(
                        Severity::Low,
                        "COOP_PERMISSIVE",
                        "Cross-Origin-Opener-Policy does not fully isolate the \
                         browsing context group",
                    )
                    .with_evidence(v.to_string()),
                );
                score -= 15;
            }
            None => {
                findings.push(Finding::new(
                    Severity::Low,
                    "COOP_MISSING",
                    "Cross-Origin-Opener-Policy is absent",
                ));
                score -= 25;
            }
        }

        if response.header("cross-origin-embedder-policy").is_none() {
            findings.push(Finding::new(
                Severity::Info,
                "COEP_MISSING",
                "Cross-Origin-Embedder-Policy is absent; cross-origin isolation \
                 is unavailable",
            ));
            score -= 10;
        }

        match response.header("cross-origin-resource-policy") {
            Some(v) if v.trim().eq_ignore_ascii_case("cross-origin") => {
                findings.push(Finding::new(
                    Severity::Info,
                    "CORP_CROSS_ORIGIN",
                    "Cross-Origin-Resource-Policy explicitly allows any origin",
                ));
                score -= 5;
            }
            Some(_) => {}
            None => {
                findings.push(Finding::new(
                    Severity::Info,
                    "CORP_MISSING",
                    "Cross-Origin-Resource-Policy is absent",
                ));
                score -= 10;
            }
        }

        let score = score.max(0) as u8;
        if score == 100 {
            Ok(CheckOutcome::pass(100))
        } else if findings.iter().any(|f| f.severity >= Severity::Low) && score < 75 {
            Ok(CheckOutcome::warn(score, findings))
        } else {
            Ok(CheckOutcome::pass(score).with_findings(findings))
        }
    }
}

pub struct PermissionsPolicyCheck;

/// Powerful features that should not be delegated to every origin
const POWERFUL_FEATURES: &[&str] = &[
    "camera",
    "microphone",
    "geolocation",
    "payment",
    "usb",
    "display-capture",
];

/// Parse `feature=(allowlist)` clauses into (feature, raw allowlist) pairs
pub fn parse_permissions_policy(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .filter_map(|clause| {
            let clause = clause.trim();
            let (feature, rest) = clause.split_once('=')?;
            Some((
                feature.trim().to_ascii_lowercase(),
                rest.trim()
                    .trim_start_matches('(')
                    .trim_end_matches(')')
                    .trim()
                    .to_string(),
            ))
        })
        .collect()
}

#[async_trait]
impl SecurityCheck for PermissionsPolicyCheck {
    fn id(&self) -> &'static str {
        "permissions_policy"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[Permissions-Policy] Scanning: {}", ctx.target);
        let response = ctx.root().await?;

        let Some(value) = response.header("permissions-policy") else {
            return Ok(CheckOutcome::warn(
                40,
                vec![Finding::new(
                    Severity::Low,
                    "PERMISSIONS_POLICY_MISSING",
                    "No Permissions-Policy header; powerful features follow \
                     browser defaults in all frames",
                )],
            ));
        };

        let clauses = parse_permissions_policy(value);
        let mut findings = Vec::new();
        let mut score: i32 = 100;

        for feature in POWERFUL_FEATURES {
            match clauses.iter().find(|(name, _)| name == feature) {
                Some((_, allowlist)) if allowlist == "*" => {
                    findings.push(
                        Finding::new(
                            Severity::Medium,
                            "PERMISSIONS_POLICY_WILDCARD",
                            format!("Feature '{}' is delegated to every origin", feature),
                        )
                        .with_evidence(format!("{}=(*)", feature)),
                    );
                    score -= 20;
                }
                Some(_) => {}
                None => {
                    findings.push(Finding::new(
                        Severity::Info,
                        "PERMISSIONS_POLICY_UNLISTED",
                        format!("Feature '{}' is not restricted by the policy", feature),
                    ));
                    score -= 5;
                }
            }
        }

        let score = score.max(0) as u8;
        if findings.iter().any(|f| f.severity >= Severity::Medium) {
            Ok(CheckOutcome::warn(score, findings))
        } else {
            Ok(CheckOutcome::pass(score).with_findings(findings))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_permissions_policy_clauses() {
        let clauses =
            parse_permissions_policy("camera=(), microphone=(self), geolocation=*");
        assert_eq!(clauses.len(), 3);
        assert_eq!(clauses[0], ("camera".to_string(), String::new()));
        assert_eq!(clauses[1], ("microphone".to_string(), "self".to_string()));
        assert_eq!(clauses[2], ("geolocation".to_string(), "*".to_string()));
    }

    #[test]
    fn malformed_clauses_are_dropped() {
        let clauses = parse_permissions_policy("camera, =()");
        assert!(clauses.iter().all(|(name, _)| !name.is_empty()));
        assert!(clauses.len() <= 1);
    }
}
