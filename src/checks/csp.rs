// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - CSP Deep Analysis
 * Parses Content-Security-Policy into directives and scores strictness
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::types::{Finding, Severity};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::info;

/// Parsed policy: directive name -> source list, in document order
pub type CspDirectives = BTreeMap<String, Vec<String>>;

pub fn parse_csp(value: &str) -> CspDirectives {
    let mut directives = CspDirectives::new();
    for clause in value.split(';') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let mut tokens = clause.split_whitespace();
        let Some(name) = tokens.next() else { continue };
        directives
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| tokens.map(|t| t.to_string()).collect());
    }
    directives
}

/// Directives whose source lists can host script or plugin content
const SCRIPT_BEARING: &[&str] = &["default-src", "script-src", "object-src"];

fn sources_for<'a>(directives: &'a CspDirectives, name: &str) -> Option<&'a Vec<String>> {
    directives
        .get(name)
        .or_else(|| directives.get("default-src"))
}

pub struct CspCheck;

#[async_trait]
impl SecurityCheck for CspCheck {
    fn id(&self) -> &'static str {
        "csp"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[CSP] Scanning: {}", ctx.target);
        let response = ctx.root().await?;

        let Some(value) = response.header("content-security-policy") else {
            let report_only = response.header("content-security-policy-report-only");
            let mut findings = vec![Finding::new(
                Severity::High,
                "CSP_MISSING",
                "No Content-Security-Policy header on the root document",
            )];
            if report_only.is_some() {
                findings.push(Finding::new(
                    Severity::Info,
                    "CSP_REPORT_ONLY",
                    "A report-only policy exists but enforces nothing",
                ));
            }
            return Ok(CheckOutcome::fail(0, findings));
        };

        let directives = parse_csp(value);
        let mut findings = Vec::new();
        let mut score: i32 = 100;

        if !directives.contains_key("default-src") {
            findings.push(Finding::new(
                Severity::Medium,
                "CSP_NO_DEFAULT_SRC",
                "Policy lacks default-src; unlisted fetch directives are unrestricted",
            ));
            score -= 25;
        }
        if !directives.contains_key("frame-ancestors") {
            findings.push(Finding::new(
                Severity::Low,
                "CSP_NO_FRAME_ANCESTORS",
                "Policy lacks frame-ancestors; framing falls back to X-Frame-Options",
            ));
            score -= 10;
        }

        for name in SCRIPT_BEARING {
            let Some(sources) = sources_for(&directives, name) else {
                continue;
            };
            for source in sources {
                let lowered = source.to_ascii_lowercase();
                match lowered.as_str() {
                    "'unsafe-inline'" => {
                        findings.push(
                            Finding::new(
                                Severity::High,
                                "CSP_UNSAFE_INLINE",
                                format!("{} permits 'unsafe-inline'", name),
                            )
                            .with_evidence(source.clone()),
                        );
                        score -= 30;
                    }
                    "'unsafe-eval'" => {
                        findings.push(
                            Finding::new(
                                Severity::High,
                                "CSP_UNSAFE_EVAL",
                                format!("{} permits 'unsafe-eval'", name),
                            )
                            .with_evidence(source.clone()),
                        );
                        score -= 25;
                    }
                    "*" => {
                        findings.push(
                            Finding::new(
                                Severity::High,
                                "CSP_WILDCARD_SOURCE",
                                format!("{} permits any origin", name),
                            )
                            .with_evidence(source.clone()),
                        );
                        score -= 30;
                    }
                    _ if lowered.starts_with("http:") => {
                        findings.push(
                            Finding::new(
                                Severity::Medium,
                                "CSP_INSECURE_SOURCE",
                                format!("{} permits a plain-HTTP source", name),
                            )
                            .with_evidence(source.clone()),
                        );
                        score -= 15;
                    }
                    _ if lowered.starts_with("*.") || lowered.contains("://*.") => {
                        findings.push(
                            Finding::new(
                                Severity::Low,
                                "CSP_WILDCARD_SUBDOMAIN",
                                format!("{} permits a wildcard subdomain", name),
                            )
                            .with_evidence(source.clone()),
                        );
                        score -= 5;
                    }
                    _ => {}
                }
            }
        }

        let score = score.max(0) as u8;
        let worst = findings.iter().map(|f| f.severity).max();
        match worst {
            Some(Severity::High) | Some(Severity::Critical) => {
                Ok(CheckOutcome::fail(score, findings))
            }
            Some(Severity::Medium) | Some(Severity::Low) => {
                Ok(CheckOutcome::warn(score, findings))
            }
            _ => Ok(CheckOutcome::pass(score).with_findings(findings)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directives_in_order() {
        let csp = parse_csp("default-src 'self'; script-src 'self' cdn.example.com");
        assert_eq!(csp["default-src"], vec!["'self'"]);
        assert_eq!(csp["script-src"], vec!["'self'", "cdn.example.com"]);
    }

    #[test]
    fn duplicate_directives_keep_first() {
        let csp = parse_csp("script-src 'self'; script-src *");
        assert_eq!(csp["script-src"], vec!["'self'"]);
    }

    #[test]
    fn script_src_falls_back_to_default_src() {
        let csp = parse_csp("default-src 'self'");
        assert_eq!(sources_for(&csp, "script-src").unwrap(), &vec!["'self'".to_string()]);
    }

    #[test]
    fn empty_clauses_are_skipped() {
        let csp = parse_csp(";; default-src 'none';;");
        assert_eq!(csp.len(), 1);
    }
}
