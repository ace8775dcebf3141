// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Security Checks
 * Probe implementations behind a uniform check interface
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

pub mod cert_transparency;
pub mod content;
pub mod cross_origin;
pub mod csp;
pub mod doh;
pub mod headers;
pub mod http_versions;
pub mod hsts_preload;
pub mod reachability;
pub mod sri;
pub mod tls_baseline;
pub mod websocket;

use crate::errors::AuditError;
use crate::transport::{FetchPolicy, HttpTransport, TransportResponse};
use crate::types::{CheckCategory, CheckStatus, Finding};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use url::Url;

/// What a check produces; the orchestrator wraps it into a `CheckResult`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    /// pass, warn or fail; skipped/error are orchestrator decisions
    pub status: CheckStatus,
    pub score: u8,
    pub findings: Vec<Finding>,
}

impl CheckOutcome {
    pub fn pass(score: u8) -> Self {
        Self {
            status: CheckStatus::Pass,
            score: score.min(100),
            findings: Vec::new(),
        }
    }

    pub fn warn(score: u8, findings: Vec<Finding>) -> Self {
        Self {
            status: CheckStatus::Warn,
            score: score.min(100),
            findings,
        }
    }

    pub fn fail(score: u8, findings: Vec<Finding>) -> Self {
        Self {
            status: CheckStatus::Fail,
            score: score.min(100),
            findings,
        }
    }

    pub fn with_findings(mut self, findings: Vec<Finding>) -> Self {
        self.findings = findings;
        self
    }
}

/// Read-only handles shared by every check of one audit.
///
/// Checks are pure functions of (target, context): all side effects go
/// through the transport, and the root-document fetch is memoized so the
/// header checks do not hammer the target.
pub struct CheckContext {
    pub target: Url,
    pub host: String,
    pub correlation_id: String,
    pub transport: Arc<HttpTransport>,
    pub cancel: CancellationToken,
    root: OnceCell<Arc<TransportResponse>>,
}

impl CheckContext {
    pub fn new(
        target: Url,
        correlation_id: &str,
        transport: Arc<HttpTransport>,
        cancel: CancellationToken,
    ) -> Result<Self, AuditError> {
        let host = target
            .host_str()
            .ok_or_else(|| AuditError::InvalidTarget {
                reason: format!("{}: no host", target),
            })?
            .to_string();
        Ok(Self {
            target,
            host,
            correlation_id: correlation_id.to_string(),
            transport,
            cancel,
            root: OnceCell::new(),
        })
    }

    pub fn policy(&self, category: CheckCategory) -> FetchPolicy {
        FetchPolicy::for_check(category, &self.correlation_id)
    }

    /// The root document, fetched once per audit and shared by all checks
    pub async fn root(&self) -> Result<Arc<TransportResponse>, AuditError> {
        self.root
            .get_or_try_init(|| async {
                let policy = self.policy(CheckCategory::Transport);
                let response = self.transport.get(self.target.as_str(), &policy).await?;
                Ok(Arc::new(response))
            })
            .await
            .cloned()
    }
}

/// One declarative security probe with a stable id
#[async_trait]
pub trait SecurityCheck: Send + Sync {
    fn id(&self) -> &'static str;
    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError>;
}

/// Construct every check implementation, keyed by catalog id
pub fn build_all() -> HashMap<&'static str, Arc<dyn SecurityCheck>> {
    let checks: Vec<Arc<dyn SecurityCheck>> = vec![
        Arc::new(reachability::ReachabilityCheck),
        Arc::new(http_versions::HttpVersionsCheck),
        Arc::new(tls_baseline::TlsBaselineCheck),
        Arc::new(headers::HstsCheck),
        Arc::new(csp::CspCheck),
        Arc::new(headers::ContentTypeOptionsCheck),
        Arc::new(headers::FrameProtectionCheck),
        Arc::new(headers::ReferrerPolicyCheck),
        Arc::new(headers::ServerTimingCheck),
        Arc::new(hsts_preload::HstsPreloadCheck),
        Arc::new(content::CookieSecurityCheck),
        Arc::new(content::MixedContentCheck),
        Arc::new(content::CacheControlCheck),
        Arc::new(cross_origin::CorsPolicyCheck),
        Arc::new(cross_origin::CrossOriginIsolationCheck),
        Arc::new(cross_origin::PermissionsPolicyCheck),
        Arc::new(sri::SubresourceIntegrityCheck),
        Arc::new(cert_transparency::CertTransparencyCheck),
        Arc::new(doh::DohSupportCheck),
        Arc::new(websocket::WebSocketSecurityCheck),
    ];
    checks.into_iter().map(|check| (check.id(), check)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;

    #[test]
    fn every_catalog_entry_has_an_implementation() {
        let implementations = build_all();
        for spec in registry::CATALOG.iter() {
            assert!(
                implementations.contains_key(spec.id),
                "missing implementation for {}",
                spec.id
            );
        }
        assert_eq!(implementations.len(), registry::CATALOG.len());
    }
}
