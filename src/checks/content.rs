// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Content Checks
 * Cookie attributes, mixed-content discovery and cache-control hygiene
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::types::{Finding, Severity};
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::info;

pub struct CookieSecurityCheck;

/// Attribute problems for one Set-Cookie line
fn cookie_issues(set_cookie: &str) -> Vec<&'static str> {
    let lowered = set_cookie.to_ascii_lowercase();
    let mut issues = Vec::new();
    if !lowered.split(';').any(|a| a.trim() == "secure") {
        issues.push("missing Secure");
    }
    if !lowered.split(';').any(|a| a.trim() == "httponly") {
        issues.push("missing HttpOnly");
    }
    if !lowered.split(';').any(|a| a.trim().starts_with("samesite=")) {
        issues.push("missing SameSite");
    } else if lowered
        .split(';')
        .any(|a| a.trim() == "samesite=none")
        && !lowered.split(';').any(|a| a.trim() == "secure")
    {
        issues.push("SameSite=None without Secure");
    }
    issues
}

#[async_trait]
impl SecurityCheck for CookieSecurityCheck {
    fn id(&self) -> &'static str {
        "cookie_security"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[Cookies] Scanning: {}", ctx.target);
        let response = ctx.root().await?;
        let cookies = response.headers_all("set-cookie");
        if cookies.is_empty() {
            return Ok(CheckOutcome::pass(100));
        }

        let mut findings = Vec::new();
        for cookie in &cookies {
            let name = cookie.split('=').next().unwrap_or("cookie").trim();
            let issues = cookie_issues(cookie);
            if !issues.is_empty() {
                findings.push(
                    Finding::new(
                        Severity::Medium,
                        "COOKIE_ATTRIBUTES_WEAK",
                        format!("Cookie '{}' {}", name, issues.join(", ")),
                    )
                    .with_evidence((*cookie).to_string()),
                );
            }
        }

        if findings.is_empty() {
            Ok(CheckOutcome::pass(100))
        } else {
            let penalty = (findings.len() as i32 * 25).min(80);
            Ok(CheckOutcome::warn((100 - penalty) as u8, findings))
        }
    }
}

pub struct MixedContentCheck;

/// Collect http:// subresource URLs referenced by an HTML document
pub fn find_mixed_content(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut insecure = Vec::new();
    for (selector, attribute) in [
        ("script[src]", "src"),
        ("link[href]", "href"),
        ("img[src]", "src"),
        ("iframe[src]", "src"),
        ("audio[src]", "src"),
        ("video[src]", "src"),
        ("source[src]", "src"),
        ("form[action]", "action"),
    ] {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&parsed) {
            if let Some(value) = element.value().attr(attribute) {
                if value.starts_with("http://") {
                    insecure.push(value.to_string());
                }
            }
        }
    }
    insecure.sort();
    insecure.dedup();
    insecure
}

#[async_trait]
impl SecurityCheck for MixedContentCheck {
    fn id(&self) -> &'static str {
        "mixed_content"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[Mixed Content] Scanning: {}", ctx.target);
        let response = ctx.root().await?;

        let is_html = response
            .header("content-type")
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false);
        if !is_html {
            return Ok(CheckOutcome::pass(100).with_findings(vec![Finding::new(
                Severity::Info,
                "MIXED_CONTENT_NOT_HTML",
                "Root document is not HTML; nothing to inspect",
            )]));
        }

        let insecure = find_mixed_content(&response.body);
        if insecure.is_empty() {
            return Ok(CheckOutcome::pass(100));
        }

        let findings: Vec<Finding> = insecure
            .iter()
            .take(10)
            .map(|src| {
                Finding::new(
                    Severity::High,
                    "MIXED_CONTENT",
                    "Plain-HTTP subresource on an HTTPS page",
                )
                .with_evidence(src.clone())
            })
            .collect();
        let penalty = (insecure.len() as i32 * 20).min(90);
        Ok(CheckOutcome::fail((100 - penalty).max(0) as u8, findings))
    }
}

pub struct CacheControlCheck;

#[async_trait]
impl SecurityCheck for CacheControlCheck {
    fn id(&self) -> &'static str {
        "cache_control"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[Cache-Control] Scanning: {}", ctx.target);
        let response = ctx.root().await?;

        let looks_authenticated = response.headers_all("set-cookie").iter().any(|c| {
            let c = c.to_ascii_lowercase();
            c.contains("session") || c.contains("auth") || c.contains("token")
        });
        if !looks_authenticated {
            return Ok(CheckOutcome::pass(100));
        }

        let cache_control = response
            .header("cache-control")
            .unwrap_or("")
            .to_ascii_lowercase();
        let private = cache_control.contains("no-store") || cache_control.contains("private");
        if private {
            Ok(CheckOutcome::pass(100))
        } else {
            Ok(CheckOutcome::warn(
                40,
                vec![Finding::new(
                    Severity::Medium,
                    "CACHEABLE_SESSION_RESPONSE",
                    "Response sets a session cookie but is cacheable by shared caches",
                )
                .with_evidence(format!("cache-control: {}", cache_control))],
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_missing_cookie_attributes() {
        let issues = cookie_issues("sid=abc123; Path=/");
        assert!(issues.contains(&"missing Secure"));
        assert!(issues.contains(&"missing HttpOnly"));
        assert!(issues.contains(&"missing SameSite"));
    }

    #[test]
    fn accepts_hardened_cookie() {
        let issues = cookie_issues("sid=abc; Path=/; Secure; HttpOnly; SameSite=Lax");
        assert!(issues.is_empty());
    }

    #[test]
    fn samesite_none_requires_secure() {
        let issues = cookie_issues("sid=abc; HttpOnly; SameSite=None");
        assert!(issues.contains(&"SameSite=None without Secure"));
    }

    #[test]
    fn finds_insecure_subresources() {
        let html = r#"
            <html><head>
            <script src="http://cdn.example.com/app.js"></script>
            <link rel="stylesheet" href="https://cdn.example.com/app.css">
            </head><body>
            <img src="http://img.example.com/logo.png">
            </body></html>
        "#;
        let found = find_mixed_content(html);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|u| u.starts_with("http://")));
    }

    #[test]
    fn clean_page_has_no_mixed_content() {
        let html = r#"<html><body><img src="https://x.example/a.png"></body></html>"#;
        assert!(find_mixed_content(html).is_empty());
    }
}
