// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Subresource Integrity Check
 * Cross-origin scripts and stylesheets must carry integrity attributes
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
use url::Url;

/// A cross-origin subresource and whether it is integrity-protected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subresource {
    pub url: String,
    pub element: &'static str,
    pub has_integrity: bool,
}

/// Extract cross-origin `<script src>` and `<link rel=stylesheet href>`
/// references from a document served at `base`
pub fn cross_origin_subresources(html: &str, base: &Url) -> Vec<Subresource> {
    let document = Html::parse_document(html);
    let base_host = base.host_str().unwrap_or_default();
    let mut resources = Vec::new();

    let collect = |selector: &str, attribute: &str, element: &'static str,
                   resources: &mut Vec<Subresource>| {
        let Ok(parsed) = Selector::parse(selector) else {
            return;
        };
        for node in document.select(&parsed) {
            let Some(reference) = node.value().attr(attribute) else {
                continue;
            };
            let Ok(resolved) = base.join(reference) else {
                continue;
            };
            if !matches!(resolved.scheme(), "http" | "https") {
                continue;
            }
            let host = resolved.host_str().unwrap_or_default();
            if host.is_empty() || host == base_host {
                continue;
            }
            resources.push(Subresource {
                url: resolved.to_string(),
                element,
                has_integrity: node
                    .value()
                    .attr("integrity")
                    .map(|v| !v.trim().is_empty())
                    .unwrap_or(false),
            });
        }
    };

    collect("script[src]", "src", "script", &mut resources);
    collect(
        r#"link[rel="stylesheet"][href]"#,
        "href",
        "stylesheet",
        &mut resources,
    );
    resources
}

pub struct SubresourceIntegrityCheck;

#[async_trait]
impl SecurityCheck for SubresourceIntegrityCheck {
    fn id(&self) -> &'static str {
        "subresource_integrity"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[SRI] Scanning: {}", ctx.target);
        let response = ctx.root().await?;

        let is_html = response
            .header("content-type")
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false);
        if !is_html {
            return Ok(CheckOutcome::pass(100).with_findings(vec![Finding::new(
                Severity::Info,
                "SRI_NOT_HTML",
                "Root document is not HTML; nothing to inspect",
            )]));
        }

        let base = Url::parse(&response.final_url).unwrap_or_else(|_| ctx.target.clone());
        let resources = cross_origin_subresources(&response.body, &base);
        if resources.is_empty() {
            return Ok(CheckOutcome::pass(100));
        }

        let unprotected: Vec<&Subresource> =
            resources.iter().filter(|r| !r.has_integrity).collect();
        if unprotected.is_empty() {
            info!(
                "[SRI] all {} cross-origin subresources carry integrity",
                resources.len()
            );
            return Ok(CheckOutcome::pass(100));
        }

        let findings: Vec<Finding> = unprotected
            .iter()
            .take(10)
            .map(|resource| {
                Finding::new(
                    Severity::Medium,
                    "SRI_MISSING",
                    format!(
                        "Cross-origin {} loaded without an integrity attribute",
                        resource.element
                    ),
                )
                .with_evidence(resource.url.clone())
            })
            .collect();

        let covered = resources.len() - unprotected.len();
        let score = (covered * 100 / resources.len()) as u8;
        Ok(CheckOutcome::warn(score, findings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.org/").unwrap()
    }

    #[test]
    fn same_origin_resources_are_ignored() {
        let html = r#"<script src="/app.js"></script>
                      <script src="https://example.org/vendor.js"></script>"#;
        assert!(cross_origin_subresources(html, &base()).is_empty());
    }

    #[test]
    fn cross_origin_script_without_integrity_is_reported() {
        let html = r#"<script src="https://cdn.example.com/lib.js"></script>"#;
        let resources = cross_origin_subresources(html, &base());
        assert_eq!(resources.len(), 1);
        assert!(!resources[0].has_integrity);
        assert_eq!(resources[0].element, "script");
    }

    #[test]
    fn integrity_attribute_is_detected() {
        let html = r#"<link rel="stylesheet"
                            href="https://cdn.example.com/app.css"
                            integrity="sha384-abc123">"#;
        let resources = cross_origin_subresources(html, &base());
        assert_eq!(resources.len(), 1);
        assert!(resources[0].has_integrity);
    }

    #[test]
    fn protocol_relative_urls_resolve_against_base() {
        let html = r#"<script src="//cdn.example.com/lib.js"></script>"#;
        let resources = cross_origin_subresources(html, &base());
        assert_eq!(resources.len(), 1);
        assert!(resources[0].url.starts_with("https://cdn.example.com/"));
    }
}
