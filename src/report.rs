// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Report Builder
 * Weighted score aggregation and report assembly
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::registry;
use crate::types::{
    AuditReport, AuditRequest, AuditStatus, CheckResult, ENGINE_VERSION,
};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Weighted mean over scorable results, rounded to the nearest point.
///
/// Skipped and errored checks carry no signal about the target's posture,
/// so they are excluded rather than dragged in as zeroes. An audit with
/// no scorable result at all scores 0.
pub fn weighted_score<'a, I>(results: I) -> u8
where
    I: IntoIterator<Item = &'a CheckResult>,
{
    let mut weighted_sum: u64 = 0;
    let mut weight_total: u64 = 0;
    for result in results {
        if !result.status.is_scorable() {
            continue;
        }
        let weight = registry::get(&result.check_id)
            .map(|spec| spec.weight as u64)
            .unwrap_or(1);
        weighted_sum += weight * result.score as u64;
        weight_total += weight;
    }
    if weight_total == 0 {
        return 0;
    }
    ((weighted_sum + weight_total / 2) / weight_total) as u8
}

/// Per-category weighted means, same exclusions as the overall score.
/// Categories with no scorable result are omitted entirely.
pub fn category_scores(results: &[CheckResult]) -> BTreeMap<String, u8> {
    let mut by_category: BTreeMap<String, Vec<&CheckResult>> = BTreeMap::new();
    for result in results {
        if result.status.is_scorable() {
            by_category
                .entry(result.category.to_string())
                .or_default()
                .push(result);
        }
    }
    by_category
        .into_iter()
        .map(|(category, members)| {
            let score = weighted_score(members.into_iter());
            (category, score)
        })
        .collect()
}

/// Assemble the frozen report for a finished audit
pub fn build(
    request: &AuditRequest,
    status: AuditStatus,
    started_at: String,
    results: Vec<CheckResult>,
) -> AuditReport {
    let overall_score = weighted_score(results.iter());
    let categories = category_scores(&results);
    debug!(
        "[Report] {} checks, overall {} ({} categories)",
        results.len(),
        overall_score,
        categories.len()
    );
    AuditReport {
        report_id: Uuid::new_v4().to_string(),
        target_url: request.target_url.clone(),
        correlation_id: request.correlation_id.clone(),
        profile: request.profile,
        status,
        started_at,
        finished_at: crate::types::now_rfc3339_millis(),
        overall_score,
        categories,
        checks: results,
        engine_version: ENGINE_VERSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckCategory, CheckStatus};

    fn result(check_id: &str, category: CheckCategory, status: CheckStatus, score: u8) -> CheckResult {
        CheckResult {
            check_id: check_id.to_string(),
            category,
            status,
            score,
            findings: Vec::new(),
            duration_ms: 5,
            from_cache: false,
            error_kind: None,
        }
    }

    #[test]
    fn weighting_follows_the_catalog() {
        // tls_baseline weight 9, server_timing weight 2
        let results = vec![
            result("tls_baseline", CheckCategory::Tls, CheckStatus::Fail, 0),
            result("server_timing", CheckCategory::Headers, CheckStatus::Pass, 100),
        ];
        // (9*0 + 2*100) / 11 = 18.18 -> 18
        assert_eq!(weighted_score(results.iter()), 18);
    }

    #[test]
    fn skipped_and_errored_carry_no_weight() {
        let results = vec![
            result("hsts", CheckCategory::Headers, CheckStatus::Pass, 100),
            result("csp", CheckCategory::Headers, CheckStatus::Skipped, 0),
            result("cors_policy", CheckCategory::Policy, CheckStatus::Error, 0),
        ];
        assert_eq!(weighted_score(results.iter()), 100);
        let categories = category_scores(&results);
        assert_eq!(categories.get("headers"), Some(&100));
        // policy had only an errored member, so no entry at all
        assert!(!categories.contains_key("policy"));
    }

    #[test]
    fn no_scorable_results_scores_zero() {
        let results = vec![result(
            "reachability",
            CheckCategory::Transport,
            CheckStatus::Error,
            0,
        )];
        assert_eq!(weighted_score(results.iter()), 0);
    }

    #[test]
    fn rounding_is_to_nearest() {
        // equal weights: (100 + 0 + 50) / 3 = 50; (100 + 85) / 2 = 92.5 -> 93
        let results = vec![
            result("hsts", CheckCategory::Headers, CheckStatus::Pass, 100),
            result("csp", CheckCategory::Headers, CheckStatus::Warn, 85),
        ];
        // both weight 8
        assert_eq!(weighted_score(results.iter()), 93);
    }
}
