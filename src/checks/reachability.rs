// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Reachability Check
 * Baseline fetch of the target root; everything else hangs off this
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::types::{Finding, Severity};
use async_trait::async_trait;
use tracing::info;

pub struct ReachabilityCheck;

#[async_trait]
impl SecurityCheck for ReachabilityCheck {
    fn id(&self) -> &'static str {
        "reachability"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[Reachability] Probing: {}", ctx.target);
        let response = ctx.root().await?;

        let mut findings = Vec::new();
        if response.status_code >= 500 {
            findings.push(
                Finding::new(
                    Severity::Medium,
                    "TARGET_SERVER_ERROR",
                    format!("Root document returned {}", response.status_code),
                )
                .with_evidence(response.final_url.clone()),
            );
            return Ok(CheckOutcome::warn(40, findings));
        }
        if response.status_code >= 400 {
            findings.push(
                Finding::new(
                    Severity::Low,
                    "TARGET_CLIENT_ERROR",
                    format!("Root document returned {}", response.status_code),
                )
                .with_evidence(response.final_url.clone()),
            );
            // Headers on an error page are still meaningful for the audit
            return Ok(CheckOutcome::warn(70, findings));
        }

        info!(
            "[Reachability] {} answered {} over {}",
            ctx.host, response.status_code, response.http_version
        );
        Ok(CheckOutcome::pass(100))
    }
}
