// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Check Orchestrator
 * Dependency-ordered, bounded-concurrency execution of the check set for
 * one audit, with progress emission and credit settlement
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::cache::{fingerprint, MultiTierCache};
use crate::checks::{CheckContext, CheckOutcome, SecurityCheck};
use crate::config::EngineConfig;
use crate::credits::CreditGuard;
use crate::errors::AuditError;
use crate::progress::ProgressTracker;
use crate::registry::{self, CheckSpec};
use crate::report;
use crate::transport::HttpTransport;
use crate::types::{
    now_rfc3339_millis, AuditReport, AuditRequest, AuditStatus, CheckResult, CheckStatus,
    ProgressPhase, ProgressState,
};
use futures_util::FutureExt;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Sum of cost units actually spent: skipped and errored checks did not
/// consume their budget and are not billed
pub fn actual_cost(results: &[CheckResult]) -> u32 {
    results
        .iter()
        .filter(|r| !matches!(r.status, CheckStatus::Skipped | CheckStatus::Error))
        .filter_map(|r| registry::get(&r.check_id))
        .map(|spec| spec.cost_units)
        .sum()
}

/// The dependency (if any) that blocks a gated check from running
pub fn blocked_by(
    spec: &CheckSpec,
    statuses: &HashMap<String, CheckStatus>,
) -> Option<String> {
    if !spec.requires_prereq_pass {
        return None;
    }
    spec.depends_on
        .iter()
        .find(|dep| {
            matches!(
                statuses.get(**dep),
                Some(CheckStatus::Fail | CheckStatus::Error | CheckStatus::Skipped)
            )
        })
        .map(|dep| dep.to_string())
}

/// What one pass over the check set produced
struct CheckSetRun {
    results: Vec<CheckResult>,
    cancelled: bool,
}

/// Runs the resolved check set of one audit to completion.
///
/// Execution follows the catalog dependency order under a bounded worker
/// pool; the whole audit races a global deadline. Whatever happens, the
/// credit hold ends terminal: committed for the spent portion on success,
/// fully refunded on cancellation or a run that produced no usable result.
pub struct Orchestrator {
    config: EngineConfig,
    transport: Arc<HttpTransport>,
    cache: Arc<MultiTierCache>,
    checks: HashMap<&'static str, Arc<dyn SecurityCheck>>,
    progress: Arc<ProgressTracker>,
    credits: Arc<CreditGuard>,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        transport: Arc<HttpTransport>,
        cache: Arc<MultiTierCache>,
        checks: HashMap<&'static str, Arc<dyn SecurityCheck>>,
        progress: Arc<ProgressTracker>,
        credits: Arc<CreditGuard>,
    ) -> Self {
        Self {
            config,
            transport,
            cache,
            checks,
            progress,
            credits,
        }
    }

    /// Validate the target before any credit is confirmed or any probe runs
    fn validate_target(target_url: &str) -> Result<Url, AuditError> {
        let url = Url::parse(target_url).map_err(|e| AuditError::InvalidTarget {
            reason: format!("{}: {}", target_url, e),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AuditError::InvalidTarget {
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if url.host_str().is_none() {
            return Err(AuditError::InvalidTarget {
                reason: format!("{}: no host", target_url),
            });
        }
        Ok(url)
    }

    /// Resolver pre-flight: a name that does not exist fails the audit
    /// before the check set starts
    async fn preflight_dns(&self, host: &str) -> Result<(), AuditError> {
        // Literal addresses skip resolution
        if host.parse::<std::net::IpAddr>().is_ok() {
            return Ok(());
        }
        let resolver = TokioResolver::builder(TokioConnectionProvider::default())
            .map_err(|e| AuditError::Internal(format!("resolver construction: {}", e)))?
            .build();
        match resolver.lookup_ip(host).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let reason = err.to_string();
                let lowered = reason.to_lowercase();
                if lowered.contains("no records found") || lowered.contains("nxdomain") {
                    Err(AuditError::DnsNxdomain {
                        host: host.to_string(),
                    })
                } else {
                    Err(AuditError::Dns {
                        host: host.to_string(),
                        reason,
                    })
                }
            }
        }
    }

    /// Run one audit end to end and return the frozen report
    pub async fn run(
        &self,
        request: &AuditRequest,
        cancel: CancellationToken,
    ) -> Result<AuditReport, AuditError> {
        let started_at = now_rfc3339_millis();
        let correlation = request.correlation_id.as_str();
        let hold_id = request.user.credit_hold_id.as_str();
        info!(
            "[Orchestrator] audit {} for {} (profile {})",
            correlation, request.target_url, request.profile
        );

        // Fatal-input failures happen before the hold is confirmed, so
        // there is nothing to refund yet.
        let target = Self::validate_target(&request.target_url)?;
        let host = target
            .host_str()
            .map(|h| h.to_string())
            .unwrap_or_default();

        let specs = registry::resolve(request.profile, request.requested_checks.as_deref())?;
        let ordered = registry::topo_sort(&specs)?;
        let total_cost: u32 = ordered.iter().map(|spec| spec.cost_units).sum();

        self.credits
            .reserve(hold_id, &request.user.user_id, total_cost)
            .await?;
        self.progress.start(correlation).await?;
        self.progress
            .emit(
                correlation,
                ProgressPhase::Setup,
                ProgressState::Started,
                None,
                2,
                &format!("{} checks selected", ordered.len()),
            )
            .await?;

        if let Err(err) = self.preflight_dns(&host).await {
            warn!("[Orchestrator] pre-flight failed for {}: {}", host, err);
            self.credits.refund_all(hold_id).await;
            let _ = self
                .progress
                .finish(correlation, ProgressState::Failed, &err.to_string())
                .await;
            return Err(err);
        }

        let run = match self
            .run_check_set(request, &target, &host, &ordered, cancel.clone())
            .await
        {
            Ok(run) => run,
            Err(err) => {
                self.credits.refund_all(hold_id).await;
                let _ = self
                    .progress
                    .finish(correlation, ProgressState::Failed, &err.to_string())
                    .await;
                return Err(err);
            }
        };

        // A cancelled audit still yields a report: every check that did not
        // finish carries status error, the hold is refunded in full.
        if run.cancelled {
            self.credits.refund_all(hold_id).await;
            let _ = self
                .progress
                .finish(correlation, ProgressState::Failed, "audit cancelled")
                .await;
            return Ok(report::build(
                request,
                AuditStatus::Failed,
                started_at,
                run.results,
            ));
        }
        let results = run.results;

        self.progress
            .emit(
                correlation,
                ProgressPhase::Aggregating,
                ProgressState::Advanced,
                None,
                99,
                "aggregating results",
            )
            .await?;

        // An audit where nothing produced a signal is a failed audit and
        // the user pays nothing for it.
        let any_usable = results.iter().any(|r| r.status.is_scorable());
        let status = if any_usable {
            AuditStatus::Completed
        } else {
            AuditStatus::Failed
        };
        match status {
            AuditStatus::Completed => {
                let spent = actual_cost(&results);
                if let Err(err) = self.credits.settle(hold_id, spent).await {
                    warn!("[Orchestrator] settlement of {} failed: {}", hold_id, err);
                }
                self.progress
                    .finish(correlation, ProgressState::Completed, "audit completed")
                    .await?;
            }
            AuditStatus::Failed => {
                self.credits.refund_all(hold_id).await;
                self.progress
                    .finish(correlation, ProgressState::Failed, "no check produced a result")
                    .await?;
            }
        }

        Ok(report::build(request, status, started_at, results))
    }

    /// Dependency-ordered execution under the worker pool and the global
    /// deadline; returns results for every selected check
    async fn run_check_set(
        &self,
        request: &AuditRequest,
        target: &Url,
        host: &str,
        ordered: &[&'static CheckSpec],
        cancel: CancellationToken,
    ) -> Result<CheckSetRun, AuditError> {
        let correlation = request.correlation_id.as_str();
        let deadline = Instant::now() + self.config.global_audit_timeout;
        let total_weight: u64 = ordered.iter().map(|s| s.weight as u64).sum::<u64>().max(1);

        let ctx = Arc::new(CheckContext::new(
            target.clone(),
            correlation,
            self.transport.clone(),
            cancel.clone(),
        )?);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        let mut indegree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&'static CheckSpec>> = HashMap::new();
        for spec in ordered {
            indegree.insert(spec.id, spec.depends_on.len());
            for dep in spec.depends_on {
                dependents.entry(*dep).or_default().push(spec);
            }
        }
        let mut ready: VecDeque<&'static CheckSpec> = ordered
            .iter()
            .filter(|spec| spec.depends_on.is_empty())
            .copied()
            .collect();

        let mut statuses: HashMap<String, CheckStatus> = HashMap::new();
        let mut results: Vec<CheckResult> = Vec::with_capacity(ordered.len());
        let mut done_weight: u64 = 0;
        let mut tasks: JoinSet<CheckResult> = JoinSet::new();

        loop {
            // Dispatch everything runnable. Gated checks whose prerequisite
            // did not pass resolve immediately as skipped, which may cascade.
            while let Some(spec) = ready.pop_front() {
                if let Some(dep) = blocked_by(spec, &statuses) {
                    let result = CheckResult::skipped(
                        spec.id,
                        spec.category,
                        &format!("prerequisite {} did not pass", dep),
                    );
                    done_weight += spec.weight as u64;
                    self.record(
                        correlation,
                        &mut statuses,
                        &mut results,
                        &mut ready,
                        &mut indegree,
                        &dependents,
                        result,
                        done_weight,
                        total_weight,
                    )
                    .await?;
                    continue;
                }

                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    let result = CheckResult::skipped(
                        spec.id,
                        spec.category,
                        "global audit budget exhausted",
                    );
                    done_weight += spec.weight as u64;
                    self.record(
                        correlation,
                        &mut statuses,
                        &mut results,
                        &mut ready,
                        &mut indegree,
                        &dependents,
                        result,
                        done_weight,
                        total_weight,
                    )
                    .await?;
                    continue;
                }

                let check = match self.checks.get(spec.id) {
                    Some(check) => check.clone(),
                    None => {
                        return Err(AuditError::Internal(format!(
                            "no implementation registered for {}",
                            spec.id
                        )))
                    }
                };
                let budget = Duration::from_millis(spec.default_timeout_ms).min(remaining);
                let ctx = ctx.clone();
                let cache = self.cache.clone();
                let semaphore = semaphore.clone();
                let host = host.to_string();
                let target_url = request.target_url.clone();
                tasks.spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return CheckResult::errored(
                                spec.id,
                                spec.category,
                                "internal",
                                "worker pool closed",
                            )
                        }
                    };
                    // A panicking check still resolves to a result so its
                    // dependents can be skipped instead of dangling
                    match AssertUnwindSafe(execute_check(
                        spec, check, ctx, cache, &host, &target_url, budget,
                    ))
                    .catch_unwind()
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => CheckResult::errored(
                            spec.id,
                            spec.category,
                            "internal",
                            "check panicked",
                        ),
                    }
                });
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next() => {
                    let result = match joined {
                        Some(Ok(result)) => result,
                        Some(Err(join_err)) => {
                            // Panics are caught inside the task; only an
                            // abort reaches here, and the abort path marks
                            // its checks itself
                            warn!("[Orchestrator] check task aborted: {}", join_err);
                            continue;
                        }
                        None => break,
                    };
                    done_weight += registry::get(&result.check_id)
                        .map(|s| s.weight as u64)
                        .unwrap_or(1);
                    self.record(
                        correlation,
                        &mut statuses,
                        &mut results,
                        &mut ready,
                        &mut indegree,
                        &dependents,
                        result,
                        done_weight,
                        total_weight,
                    )
                    .await?;
                }
                _ = cancel.cancelled() => {
                    info!("[Orchestrator] audit {} cancelled", correlation);
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    // Every check without an outcome surfaces as errored so
                    // the failed report still covers the whole selection
                    for spec in ordered {
                        if !statuses.contains_key(spec.id) {
                            statuses.insert(spec.id.to_string(), CheckStatus::Error);
                            results.push(CheckResult::errored(
                                spec.id,
                                spec.category,
                                "cancelled",
                                "audit cancelled",
                            ));
                        }
                    }
                    return Ok(CheckSetRun {
                        results,
                        cancelled: true,
                    });
                }
            }
        }

        debug!(
            "[Orchestrator] audit {} finished {} checks",
            correlation,
            results.len()
        );
        Ok(CheckSetRun {
            results,
            cancelled: false,
        })
    }

    /// Fold one finished check into the run state and emit its progress
    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        correlation: &str,
        statuses: &mut HashMap<String, CheckStatus>,
        results: &mut Vec<CheckResult>,
        ready: &mut VecDeque<&'static CheckSpec>,
        indegree: &mut HashMap<&str, usize>,
        dependents: &HashMap<&str, Vec<&'static CheckSpec>>,
        result: CheckResult,
        done_weight: u64,
        total_weight: u64,
    ) -> Result<(), AuditError> {
        statuses.insert(result.check_id.clone(), result.status);
        if let Some(children) = dependents.get(result.check_id.as_str()) {
            for child in children {
                if let Some(degree) = indegree.get_mut(child.id) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(*child);
                    }
                }
            }
        }

        // Weighted completion on the full scale; 100 is reserved for the
        // terminal Finalizing event
        let percent = ((done_weight * 100) / total_weight).min(99) as u8;
        self.progress
            .emit(
                correlation,
                ProgressPhase::Checking,
                ProgressState::Advanced,
                Some(&result.check_id),
                percent,
                &format!("{} {}", result.check_id, result.status.as_str()),
            )
            .await?;
        results.push(result);
        Ok(())
    }
}

/// Run one check, through the result cache when the catalog allows it
async fn execute_check(
    spec: &'static CheckSpec,
    check: Arc<dyn SecurityCheck>,
    ctx: Arc<CheckContext>,
    cache: Arc<MultiTierCache>,
    host: &str,
    target_url: &str,
    budget: Duration,
) -> CheckResult {
    let started = Instant::now();

    let outcome: Result<(CheckOutcome, bool), AuditError> = if spec.cacheable {
        let key = fingerprint(spec.id, host, target_url);
        let ttl = Duration::from_secs(spec.cache_ttl_s);
        let computed = cache
            .get_or_compute(&key, ttl, || async {
                let outcome = run_with_budget(spec, &check, &ctx, budget).await?;
                serde_json::to_value(&outcome)
                    .map_err(|e| AuditError::Internal(format!("outcome encode: {}", e)))
            })
            .await;
        computed.and_then(|(value, from_cache)| {
            let outcome: CheckOutcome = serde_json::from_value(value)
                .map_err(|e| AuditError::Internal(format!("outcome decode: {}", e)))?;
            Ok((outcome, from_cache))
        })
    } else {
        run_with_budget(spec, &check, &ctx, budget)
            .await
            .map(|outcome| (outcome, false))
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok((outcome, from_cache)) => CheckResult {
            check_id: spec.id.to_string(),
            category: spec.category,
            status: outcome.status,
            score: outcome.score,
            findings: outcome.findings,
            duration_ms,
            from_cache,
            error_kind: None,
        },
        Err(err) => {
            debug!("[Orchestrator] {} errored: {}", spec.id, err);
            let mut result =
                CheckResult::errored(spec.id, spec.category, err.kind(), &err.to_string());
            result.duration_ms = duration_ms;
            result
        }
    }
}

async fn run_with_budget(
    spec: &'static CheckSpec,
    check: &Arc<dyn SecurityCheck>,
    ctx: &CheckContext,
    budget: Duration,
) -> Result<CheckOutcome, AuditError> {
    match timeout(budget, check.run(ctx)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(AuditError::Timeout {
            operation: format!("check {}", spec.id),
            duration: budget,
        }),
    }
}
