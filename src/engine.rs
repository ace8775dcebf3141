// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Audit Engine
 * Top-level facade wiring the transport, cache, registry, progress and
 * billing collaborators into one audit entry point
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::cache::{CacheStats, MultiTierCache};
use crate::checks;
use crate::circuit_breaker::{BreakerConfig, BreakerRegistry};
use crate::config::EngineConfig;
use crate::credits::CreditGuard;
use crate::errors::AuditError;
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressTracker;
use crate::rate_limiter::HostRateLimiter;
use crate::registry;
use crate::stores::{Collaborators, ReportStore};
use crate::transport::HttpTransport;
use crate::types::{AuditReport, AuditRequest, ENGINE_VERSION};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The audit engine, constructed once per process and shared.
///
/// Construction validates the check catalog and builds the shared
/// resilience layers; per-invocation state lives in the orchestrator run.
pub struct AuditEngine {
    orchestrator: Orchestrator,
    cache: Arc<MultiTierCache>,
    reports: Arc<dyn ReportStore>,
}

impl AuditEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self, AuditError> {
        registry::validate_catalog()?;

        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig {
            window_size: config.breaker_window_size,
            trip_threshold: config.breaker_trip_threshold,
            min_failures: config.breaker_min_failures,
            cooldown_base: config.breaker_cooldown_base,
            cooldown_cap: config.breaker_cooldown_cap,
        }));
        let rate_limiter = Arc::new(HostRateLimiter::new(
            config.per_host_rps,
            config.rate_queue_depth,
        ));
        let transport = Arc::new(HttpTransport::new(&config, breakers, rate_limiter)?);
        let cache = Arc::new(MultiTierCache::new(
            config.l1_cache_size,
            collaborators.cache.clone(),
        ));
        let progress = Arc::new(ProgressTracker::new(
            collaborators.progress_log.clone(),
            collaborators.progress_channel.clone(),
        ));
        let credits = Arc::new(CreditGuard::new(collaborators.credits.clone()));

        let orchestrator = Orchestrator::new(
            config,
            transport,
            cache.clone(),
            checks::build_all(),
            progress,
            credits,
        );

        info!("[Engine] audit engine v{} ready", ENGINE_VERSION);
        Ok(Self {
            orchestrator,
            cache,
            reports: collaborators.reports,
        })
    }

    /// Run one audit to completion and persist its report
    pub async fn invoke_audit(&self, request: &AuditRequest) -> Result<AuditReport, AuditError> {
        self.invoke_audit_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Like `invoke_audit`, with caller-driven cancellation. A cancelled
    /// audit refunds the hold in full and persists nothing.
    pub async fn invoke_audit_with_cancel(
        &self,
        request: &AuditRequest,
        cancel: CancellationToken,
    ) -> Result<AuditReport, AuditError> {
        let report = self.orchestrator.run(request, cancel).await?;
        self.reports.put(&report).await?;
        info!(
            "[Engine] audit {} -> report {} (score {})",
            request.correlation_id, report.report_id, report.overall_score
        );
        Ok(report)
    }

    pub async fn report(&self, report_id: &str) -> Result<Option<AuditReport>, AuditError> {
        self.reports.get(report_id).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
