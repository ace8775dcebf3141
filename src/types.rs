// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Core Audit Types
 * Shared data model for audit requests, check results and reports
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Engine version, part of every report and cache fingerprint
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Audit profile determines which checks are selected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuditProfile {
    Basic,
    Standard,
    Deep,
}

impl Default for AuditProfile {
    fn default() -> Self {
        AuditProfile::Standard
    }
}

impl std::fmt::Display for AuditProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AuditProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditProfile::Basic => "basic",
            AuditProfile::Standard => "standard",
            AuditProfile::Deep => "deep",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Some(AuditProfile::Basic),
            "standard" => Some(AuditProfile::Standard),
            "deep" => Some(AuditProfile::Deep),
            _ => None,
        }
    }
}

/// Category a check belongs to; also the breaker partition key
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CheckCategory {
    Transport,
    Tls,
    Headers,
    Dns,
    Content,
    Policy,
}

impl CheckCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCategory::Transport => "transport",
            CheckCategory::Tls => "tls",
            CheckCategory::Headers => "headers",
            CheckCategory::Dns => "dns",
            CheckCategory::Content => "content",
            CheckCategory::Policy => "policy",
        }
    }
}

impl std::fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of an individual finding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A single observation produced by a check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub severity: Severity,
    /// Stable finding code, e.g. HSTS_NOT_PRELOADED
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl Finding {
    pub fn new(severity: Severity, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// Terminal status of a check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Skipped,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Fail => "fail",
            CheckStatus::Warn => "warn",
            CheckStatus::Skipped => "skipped",
            CheckStatus::Error => "error",
        }
    }

    /// Whether the result participates in weighted scoring
    pub fn is_scorable(&self) -> bool {
        matches!(self, CheckStatus::Pass | CheckStatus::Fail | CheckStatus::Warn)
    }
}

/// Outcome of one check within an audit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub check_id: String,
    pub category: CheckCategory,
    pub status: CheckStatus,
    /// 0..100; 0 for skipped/error results
    pub score: u8,
    pub findings: Vec<Finding>,
    pub duration_ms: u64,
    pub from_cache: bool,
    /// Populated only when status == error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl CheckResult {
    pub fn skipped(check_id: &str, category: CheckCategory, reason: &str) -> Self {
        Self {
            check_id: check_id.to_string(),
            category,
            status: CheckStatus::Skipped,
            score: 0,
            findings: vec![Finding::new(Severity::Info, "CHECK_SKIPPED", reason)],
            duration_ms: 0,
            from_cache: false,
            error_kind: None,
        }
    }

    pub fn errored(check_id: &str, category: CheckCategory, kind: &str, message: &str) -> Self {
        Self {
            check_id: check_id.to_string(),
            category,
            status: CheckStatus::Error,
            score: 0,
            findings: vec![Finding::new(Severity::Info, "CHECK_ERROR", message)],
            duration_ms: 0,
            from_cache: false,
            error_kind: Some(kind.to_string()),
        }
    }
}

/// Overall audit status surfaced on the report
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Completed,
    Failed,
}

/// Aggregated audit report, frozen once the orchestrator exits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub report_id: String,
    pub target_url: String,
    pub correlation_id: String,
    pub profile: AuditProfile,
    pub status: AuditStatus,
    /// RFC 3339 UTC, millisecond precision
    pub started_at: String,
    pub finished_at: String,
    /// Weighted mean over non-skipped, non-error checks
    pub overall_score: u8,
    /// Per-category weighted means, same exclusions
    pub categories: BTreeMap<String, u8>,
    pub checks: Vec<CheckResult>,
    pub engine_version: String,
}

/// Caller identity and billing context forwarded by the request handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
    pub plan: String,
    /// Pre-allocated hold created by the billing layer
    pub credit_hold_id: String,
}

/// Immutable input to one audit run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub target_url: String,
    #[serde(default)]
    pub profile: AuditProfile,
    /// Optional explicit subset of check ids to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_checks: Option<Vec<String>>,
    pub user: UserContext,
    pub correlation_id: String,
}

/// Phase of an audit, in emission order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    Setup,
    Checking,
    Aggregating,
    Finalizing,
}

/// State carried by a progress event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressState {
    Started,
    Advanced,
    Completed,
    Failed,
}

/// One entry in the ordered progress stream of an audit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub correlation_id: String,
    /// Strictly increasing per correlation, no gaps
    pub sequence: u64,
    pub phase: ProgressPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_id: Option<String>,
    pub state: ProgressState,
    /// Clamped monotonically non-decreasing per correlation
    pub percent: u8,
    pub detail: String,
    pub emitted_at: String,
}

/// Status of a credit hold; terminal once committed or refunded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HoldStatus {
    Held,
    Committed,
    Refunded,
}

/// A reserved-but-uncommitted quantity of user credits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditHold {
    pub hold_id: String,
    pub user_id: String,
    pub amount: u32,
    pub status: HoldStatus,
    /// Portion committed when terminal
    pub committed: u32,
    /// Portion refunded when terminal
    pub refunded: u32,
}

/// Current UTC timestamp in RFC 3339 with millisecond precision
pub fn now_rfc3339_millis() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_round_trip() {
        for p in [AuditProfile::Basic, AuditProfile::Standard, AuditProfile::Deep] {
            assert_eq!(AuditProfile::parse(p.as_str()), Some(p));
        }
        assert_eq!(AuditProfile::parse("insane"), None);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn report_serde_round_trip() {
        let report = AuditReport {
            report_id: "7b9c4a52-07d1-4b3c-9a3e-2f8d6f1e0c11".into(),
            target_url: "https://example.org/".into(),
            correlation_id: "corr-1".into(),
            profile: AuditProfile::Standard,
            status: AuditStatus::Completed,
            started_at: "2026-02-11T08:30:00.000Z".into(),
            finished_at: "2026-02-11T08:30:12.412Z".into(),
            overall_score: 84,
            categories: BTreeMap::from([("headers".to_string(), 80u8)]),
            checks: vec![CheckResult {
                check_id: "hsts".into(),
                category: CheckCategory::Headers,
                status: CheckStatus::Warn,
                score: 60,
                findings: vec![Finding::new(
                    Severity::Medium,
                    "HSTS_MAX_AGE_SHORT",
                    "max-age below one year",
                )],
                duration_ms: 42,
                from_cache: false,
                error_kind: None,
            }],
            engine_version: ENGINE_VERSION.into(),
        };

        let json = serde_json::to_string(&report).unwrap();
        let parsed: AuditReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
        // Wire format is camelCase like the rest of the platform
        assert!(json.contains("\"reportId\""));
        assert!(json.contains("\"overallScore\""));
    }

    #[test]
    fn timestamps_have_millis() {
        let ts = now_rfc3339_millis();
        // e.g. 2026-02-11T08:30:00.123Z
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.split('.').count(), 2);
        assert_eq!(ts.split('.').nth(1).unwrap().len(), 4); // "123Z"
    }
}
