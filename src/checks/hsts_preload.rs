// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - HSTS Preload Check
 * Preload-eligibility of the STS policy plus snapshot membership
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::headers::{parse_hsts, HSTS_MIN_MAX_AGE};
use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::preload;
use crate::types::{Finding, Severity};
use async_trait::async_trait;
use tracing::info;

pub struct HstsPreloadCheck;

#[async_trait]
impl SecurityCheck for HstsPreloadCheck {
    fn id(&self) -> &'static str {
        "hsts_preload"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[HSTS Preload] Scanning: {}", ctx.host);
        let response = ctx.root().await?;
        let directives = response
            .header("strict-transport-security")
            .map(parse_hsts)
            .unwrap_or_default();

        let mut findings = Vec::new();
        let mut eligible = true;

        if directives.max_age.unwrap_or(0) < HSTS_MIN_MAX_AGE {
            eligible = false;
            findings.push(Finding::new(
                Severity::Medium,
                "HSTS_PRELOAD_MAX_AGE",
                format!(
                    "Preload requires max-age >= {}; policy has {:?}",
                    HSTS_MIN_MAX_AGE, directives.max_age
                ),
            ));
        }
        if !directives.include_subdomains {
            eligible = false;
            findings.push(Finding::new(
                Severity::Medium,
                "HSTS_PRELOAD_SUBDOMAINS",
                "Preload requires the includeSubDomains directive",
            ));
        }
        if !directives.preload {
            eligible = false;
            findings.push(Finding::new(
                Severity::Medium,
                "HSTS_PRELOAD_DIRECTIVE",
                "Preload requires the preload directive",
            ));
        }

        let listed = preload::contains(&ctx.host);
        if listed {
            info!("[HSTS Preload] {} is in the preload snapshot", ctx.host);
            if eligible {
                return Ok(CheckOutcome::pass(100));
            }
            // Listed but the served policy regressed below eligibility
            findings.push(Finding::new(
                Severity::High,
                "HSTS_PRELOAD_REGRESSED",
                "Host is preloaded but the served policy no longer meets \
                 preload requirements",
            ));
            return Ok(CheckOutcome::warn(50, findings));
        }

        findings.push(
            Finding::new(
                Severity::High,
                "HSTS_NOT_PRELOADED",
                "Host is not in the browser HSTS preload list; first-visit \
                 connections are unprotected",
            )
            .with_evidence(ctx.host.clone()),
        );
        if eligible {
            // Policy is ready; submission is the only missing step
            Ok(CheckOutcome::warn(60, findings))
        } else {
            Ok(CheckOutcome::fail(20, findings))
        }
    }
}
