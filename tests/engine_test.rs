// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Engine Integration Tests
 * End-to-end audits against a mock origin: completion, settlement,
 * caching, cancellation and progress ordering
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use aivedha_guard::config::EngineConfig;
use aivedha_guard::engine::AuditEngine;
use aivedha_guard::stores::{
    Collaborators, MemoryCacheStore, MemoryCreditService, MemoryProgressChannel,
    MemoryProgressLog, MemoryReportStore,
};
use aivedha_guard::types::{
    AuditProfile, AuditRequest, AuditStatus, CheckStatus, HoldStatus, ProgressPhase,
    ProgressState, UserContext,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    engine: AuditEngine,
    credits: Arc<MemoryCreditService>,
    progress_log: Arc<MemoryProgressLog>,
}

fn harness(config: EngineConfig) -> Harness {
    let credits = Arc::new(MemoryCreditService::new());
    let progress_log = Arc::new(MemoryProgressLog::new());
    let collaborators = Collaborators {
        reports: Arc::new(MemoryReportStore::new()),
        cache: Arc::new(MemoryCacheStore::new()),
        credits: credits.clone(),
        progress_log: progress_log.clone(),
        progress_channel: Arc::new(MemoryProgressChannel::new()),
    };
    Harness {
        engine: AuditEngine::new(config, collaborators).unwrap(),
        credits,
        progress_log,
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        per_host_rps: 200,
        max_attempts: 1,
        ..EngineConfig::default()
    }
}

fn request(target: &str, profile: AuditProfile, tag: &str) -> AuditRequest {
    AuditRequest {
        target_url: target.to_string(),
        profile,
        requested_checks: None,
        user: UserContext {
            user_id: "user-1".to_string(),
            plan: "pro".to_string(),
            credit_hold_id: format!("hold-{}", tag),
        },
        correlation_id: format!("corr-{}", tag),
    }
}

async fn mount_healthy_origin(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Security-Policy", "default-src 'self'; frame-ancestors 'none'")
                .insert_header("Strict-Transport-Security", "max-age=63072000; includeSubDomains")
                .insert_header("X-Content-Type-Options", "nosniff")
                .insert_header("Referrer-Policy", "strict-origin-when-cross-origin")
                .insert_header("Content-Type", "text/html")
                .set_body_string("<html><head></head><body>ok</body></html>"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn standard_audit_completes_and_settles_credits() {
    let server = MockServer::start().await;
    mount_healthy_origin(&server).await;

    let harness = harness(fast_config());
    let request = request(&format!("{}/", server.uri()), AuditProfile::Standard, "std");

    let report = harness.engine.invoke_audit(&request).await.unwrap();
    assert_eq!(report.status, AuditStatus::Completed);
    assert_eq!(report.checks.len(), 16);
    assert_eq!(report.profile, AuditProfile::Standard);
    assert!(report.overall_score <= 100);

    // The report is persisted and readable back
    let stored = harness.engine.report(&report.report_id).await.unwrap();
    assert_eq!(stored.unwrap().report_id, report.report_id);

    // Settlement is terminal and conserves the hold
    let hold = harness.credits.hold("hold-std").await.unwrap();
    assert_eq!(hold.status, HoldStatus::Committed);
    assert_eq!(hold.committed + hold.refunded, hold.amount);
    assert!(hold.committed > 0);
}

#[tokio::test]
async fn http_target_fails_tls_checks_but_audit_completes() {
    let server = MockServer::start().await;
    mount_healthy_origin(&server).await;

    let harness = harness(fast_config());
    let request = request(&format!("{}/", server.uri()), AuditProfile::Basic, "tls");

    let report = harness.engine.invoke_audit(&request).await.unwrap();
    assert_eq!(report.status, AuditStatus::Completed);

    let tls = report
        .checks
        .iter()
        .find(|c| c.check_id == "tls_baseline")
        .unwrap();
    assert_eq!(tls.status, CheckStatus::Fail);
    assert!(tls.findings.iter().any(|f| f.code == "NO_HTTPS"));
}

#[tokio::test]
async fn gated_checks_skip_when_the_prerequisite_fails() {
    let server = MockServer::start().await;
    // No HSTS header at all, so hsts fails and hsts_preload must skip
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain"))
        .mount(&server)
        .await;

    let harness = harness(fast_config());
    let request = request(&format!("{}/", server.uri()), AuditProfile::Standard, "gate");

    let report = harness.engine.invoke_audit(&request).await.unwrap();
    let hsts = report.checks.iter().find(|c| c.check_id == "hsts").unwrap();
    assert_eq!(hsts.status, CheckStatus::Fail);
    let preload = report
        .checks
        .iter()
        .find(|c| c.check_id == "hsts_preload")
        .unwrap();
    assert_eq!(preload.status, CheckStatus::Skipped);

    // Skipped checks are not billed
    let hold = harness.credits.hold("hold-gate").await.unwrap();
    assert_eq!(hold.status, HoldStatus::Committed);
    assert!(hold.refunded >= 1);
}

#[tokio::test]
async fn second_audit_reads_cacheable_results_from_cache() {
    let server = MockServer::start().await;
    mount_healthy_origin(&server).await;
    let target = format!("{}/", server.uri());

    let harness = harness(fast_config());
    let first = harness
        .engine
        .invoke_audit(&request(&target, AuditProfile::Basic, "c1"))
        .await
        .unwrap();
    assert!(first.checks.iter().all(|c| !c.from_cache));

    let second = harness
        .engine
        .invoke_audit(&request(&target, AuditProfile::Basic, "c2"))
        .await
        .unwrap();
    let cached = second
        .checks
        .iter()
        .filter(|c| c.from_cache)
        .map(|c| c.check_id.clone())
        .collect::<Vec<_>>();
    assert!(cached.contains(&"hsts".to_string()), "cached: {:?}", cached);
    // reachability is deliberately uncacheable
    assert!(!cached.contains(&"reachability".to_string()));

    let stats = harness.engine.cache_stats();
    assert!(stats.l1_hits > 0);
}

#[tokio::test]
async fn invalid_target_fails_before_any_credit_is_confirmed() {
    let harness = harness(fast_config());
    let request = request("ftp://example.org/", AuditProfile::Basic, "bad");

    let err = harness.engine.invoke_audit(&request).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_target");
    assert!(err.is_fatal_input());
    assert!(harness.credits.hold("hold-bad").await.is_none());
}

#[tokio::test]
async fn unresolvable_domain_fails_the_audit_and_refunds_in_full() {
    let harness = harness(fast_config());
    let request = request("https://does-not-exist.invalid/", AuditProfile::Basic, "nx");

    let err = harness.engine.invoke_audit(&request).await.unwrap_err();
    assert!(
        matches!(err.kind(), "dns_nxdomain" | "dns"),
        "unexpected kind {}",
        err.kind()
    );

    let hold = harness.credits.hold("hold-nx").await.unwrap();
    assert_eq!(hold.status, HoldStatus::Refunded);
    assert_eq!(hold.refunded, hold.amount);
}

#[tokio::test]
async fn cancellation_fails_the_audit_with_errored_checks_and_full_refund() {
    let server = MockServer::start().await;
    mount_healthy_origin(&server).await;

    let harness = harness(fast_config());
    let request = request(&format!("{}/", server.uri()), AuditProfile::Standard, "cxl");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = harness
        .engine
        .invoke_audit_with_cancel(&request, cancel)
        .await
        .unwrap();

    // The report still covers every selected check
    assert_eq!(report.status, AuditStatus::Failed);
    assert_eq!(report.checks.len(), 16);
    assert!(report.checks.iter().all(|c| {
        c.status == CheckStatus::Error && c.error_kind.as_deref() == Some("cancelled")
    }));
    assert_eq!(report.overall_score, 0);

    let hold = harness.credits.hold("hold-cxl").await.unwrap();
    assert_eq!(hold.status, HoldStatus::Refunded);
    assert_eq!(hold.refunded, hold.amount);
}

#[tokio::test]
async fn slow_origin_times_out_checks_and_skips_dependents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(8)))
        .mount(&server)
        .await;

    let config = EngineConfig {
        per_host_rps: 200,
        max_attempts: 1,
        global_audit_timeout: Duration::from_millis(700),
        ..EngineConfig::default()
    };
    let harness = harness(config);
    let mut request = request(&format!("{}/", server.uri()), AuditProfile::Standard, "slow");
    request.requested_checks = Some(vec!["hsts_preload".to_string()]);

    let report = harness.engine.invoke_audit(&request).await.unwrap();
    assert_eq!(report.status, AuditStatus::Failed);

    let reach = report
        .checks
        .iter()
        .find(|c| c.check_id == "reachability")
        .unwrap();
    assert_eq!(reach.status, CheckStatus::Error);
    assert_eq!(reach.error_kind.as_deref(), Some("timeout"));

    let hsts = report.checks.iter().find(|c| c.check_id == "hsts").unwrap();
    assert_eq!(hsts.status, CheckStatus::Skipped);
    let preload = report
        .checks
        .iter()
        .find(|c| c.check_id == "hsts_preload")
        .unwrap();
    assert_eq!(preload.status, CheckStatus::Skipped);

    // Nothing usable was produced, so the hold is refunded in full
    let hold = harness.credits.hold("hold-slow").await.unwrap();
    assert_eq!(hold.status, HoldStatus::Refunded);
    assert_eq!(hold.refunded, hold.amount);
}

#[tokio::test]
async fn blocked_network_yields_failed_audit_and_full_refund() {
    // rps 0 is the engine's test mode: every outbound call is refused
    let config = EngineConfig {
        per_host_rps: 0,
        max_attempts: 1,
        ..EngineConfig::default()
    };
    let harness = harness(config);
    let request = request("http://127.0.0.1:9/", AuditProfile::Basic, "blk");

    let report = harness.engine.invoke_audit(&request).await.unwrap();
    assert_eq!(report.status, AuditStatus::Failed);
    assert!(report
        .checks
        .iter()
        .all(|c| matches!(c.status, CheckStatus::Error | CheckStatus::Skipped)));
    assert_eq!(report.overall_score, 0);

    let hold = harness.credits.hold("hold-blk").await.unwrap();
    assert_eq!(hold.status, HoldStatus::Refunded);
    assert_eq!(hold.refunded, hold.amount);
}

#[tokio::test]
async fn progress_stream_is_gap_free_and_ends_finalized() {
    let server = MockServer::start().await;
    mount_healthy_origin(&server).await;

    let harness = harness(fast_config());
    let request = request(&format!("{}/", server.uri()), AuditProfile::Basic, "prog");
    harness.engine.invoke_audit(&request).await.unwrap();

    let events = harness.progress_log.all("corr-prog").await;
    assert!(!events.is_empty());
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence, (i + 1) as u64, "gap at {}", i);
    }
    let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));

    let last = events.last().unwrap();
    assert_eq!(last.phase, ProgressPhase::Finalizing);
    assert_eq!(last.state, ProgressState::Completed);
    assert_eq!(last.percent, 100);

    // Every selected check appears exactly once in the stream
    let mut check_events: Vec<&str> = events
        .iter()
        .filter_map(|e| e.check_id.as_deref())
        .collect();
    check_events.sort_unstable();
    check_events.dedup();
    assert_eq!(check_events.len(), 8);
}

#[tokio::test]
async fn explicit_check_subset_runs_with_dependencies() {
    let server = MockServer::start().await;
    mount_healthy_origin(&server).await;

    let harness = harness(fast_config());
    let mut request = request(&format!("{}/", server.uri()), AuditProfile::Standard, "sub");
    request.requested_checks = Some(vec!["hsts_preload".to_string()]);

    let report = harness.engine.invoke_audit(&request).await.unwrap();
    let mut ids: Vec<&str> = report.checks.iter().map(|c| c.check_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["hsts", "hsts_preload", "reachability"]);
}
