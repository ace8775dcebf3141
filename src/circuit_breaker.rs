// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Circuit Breaker Registry
 * Per-(host, category) breakers over a sliding outcome window
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::errors::AuditError;
use crate::types::CheckCategory;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker tuning; defaults follow the engine contract
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Sliding window of most recent outcomes
    pub window_size: usize,
    /// Failure rate over the window that trips the breaker
    pub trip_threshold: f64,
    /// Minimum failures in the window before tripping
    pub min_failures: usize,
    /// Open cooldown base; doubles per consecutive open cycle
    pub cooldown_base: Duration,
    pub cooldown_cap: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            trip_threshold: 0.5,
            min_failures: 5,
            cooldown_base: Duration::from_secs(10),
            cooldown_cap: Duration::from_secs(300),
        }
    }
}

/// Admission for one outbound attempt, handed out by `acquire`.
///
/// Dropping the permit without a matching `record` releases the half-open
/// probe slot: an attempt future that is aborted mid-flight must not leave
/// the breaker waiting forever for an outcome that will never arrive.
#[must_use]
#[derive(Debug)]
pub struct BreakerPermit {
    probe_flag: Option<Arc<AtomicBool>>,
}

impl BreakerPermit {
    fn admitted() -> Self {
        Self { probe_flag: None }
    }

    fn probe(flag: Arc<AtomicBool>) -> Self {
        Self {
            probe_flag: Some(flag),
        }
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if let Some(flag) = self.probe_flag.take() {
            flag.store(false, Ordering::Release);
        }
    }
}

#[derive(Debug)]
struct BreakerStatus {
    state: CircuitState,
    /// true = failure, bounded to window_size entries
    window: VecDeque<bool>,
    consecutive_failures: u32,
    /// consecutive open cycles, drives exponential cooldown
    open_cycles: u32,
    opened_at: Option<Instant>,
    next_probe_at: Option<Instant>,
    /// Shared with the probe's permit; replaced once the probe settles so
    /// a stale permit drop cannot release a later probe's slot
    half_open_inflight: Arc<AtomicBool>,
}

impl BreakerStatus {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            consecutive_failures: 0,
            open_cycles: 0,
            opened_at: None,
            next_probe_at: None,
            half_open_inflight: Arc::new(AtomicBool::new(false)),
        }
    }

    fn record_outcome(&mut self, failure: bool, window_size: usize) {
        self.window.push_back(failure);
        while self.window.len() > window_size {
            self.window.pop_front();
        }
        if failure {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }
    }

    fn failure_count(&self) -> usize {
        self.window.iter().filter(|f| **f).count()
    }

    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.failure_count() as f64 / self.window.len() as f64
    }
}

/// Thread-safe registry of circuit breakers, one per (host, category).
///
/// Breakers are process-local; consistency across workers is not required.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<(String, CheckCategory), BreakerStatus>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    fn cooldown_for(&self, open_cycles: u32) -> Duration {
        let factor = 2u32.saturating_pow(open_cycles.min(16));
        (self.config.cooldown_base * factor).min(self.config.cooldown_cap)
    }

    /// Ask permission for one outbound attempt. Returns a permit, or
    /// `BreakerOpen` while the breaker is open or a half-open probe is
    /// already in flight. The permit must stay alive until the outcome is
    /// recorded; dropping it earlier releases the probe slot.
    pub async fn acquire(
        &self,
        host: &str,
        category: CheckCategory,
    ) -> Result<BreakerPermit, AuditError> {
        let mut breakers = self.breakers.write().await;
        let status = breakers
            .entry((host.to_string(), category))
            .or_insert_with(BreakerStatus::new);

        match status.state {
            CircuitState::Closed => Ok(BreakerPermit::admitted()),
            CircuitState::Open => {
                let probe_due = status
                    .next_probe_at
                    .map(|at| Instant::now() >= at)
                    .unwrap_or(true);
                if probe_due {
                    status.state = CircuitState::HalfOpen;
                    status.half_open_inflight.store(true, Ordering::Release);
                    debug!("breaker half-open for {} ({}), probing", host, category);
                    Ok(BreakerPermit::probe(status.half_open_inflight.clone()))
                } else {
                    Err(AuditError::BreakerOpen {
                        host: host.to_string(),
                        category: category.as_str().to_string(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if status.half_open_inflight.load(Ordering::Acquire) {
                    Err(AuditError::BreakerOpen {
                        host: host.to_string(),
                        category: category.as_str().to_string(),
                    })
                } else {
                    status.half_open_inflight.store(true, Ordering::Release);
                    Ok(BreakerPermit::probe(status.half_open_inflight.clone()))
                }
            }
        }
    }

    /// Record the outcome of an attempt previously admitted by `acquire`
    pub async fn record(&self, host: &str, category: CheckCategory, success: bool) {
        let mut breakers = self.breakers.write().await;
        let status = breakers
            .entry((host.to_string(), category))
            .or_insert_with(BreakerStatus::new);

        match status.state {
            CircuitState::HalfOpen => {
                // Probe settled: detach its permit by swapping in a fresh flag
                status.half_open_inflight = Arc::new(AtomicBool::new(false));
                if success {
                    debug!("breaker closed for {} ({}) after probe", host, category);
                    *status = BreakerStatus::new();
                } else {
                    status.open_cycles += 1;
                    let cooldown = self.cooldown_for(status.open_cycles);
                    status.state = CircuitState::Open;
                    status.opened_at = Some(Instant::now());
                    status.next_probe_at = Some(Instant::now() + cooldown);
                    warn!(
                        "breaker re-opened for {} ({}), cooldown {:?}",
                        host, category, cooldown
                    );
                }
            }
            CircuitState::Closed => {
                status.record_outcome(!success, self.config.window_size);
                let failures = status.failure_count();
                if failures >= self.config.min_failures
                    && status.failure_rate() >= self.config.trip_threshold
                {
                    let cooldown = self.cooldown_for(status.open_cycles);
                    status.state = CircuitState::Open;
                    status.opened_at = Some(Instant::now());
                    status.next_probe_at = Some(Instant::now() + cooldown);
                    warn!(
                        "breaker tripped for {} ({}): {}/{} failures, cooldown {:?}",
                        host,
                        category,
                        failures,
                        status.window.len(),
                        cooldown
                    );
                }
            }
            // Outcome raced a state change; count it but do not transition
            CircuitState::Open => {
                status.record_outcome(!success, self.config.window_size);
            }
        }
    }

    pub async fn state(&self, host: &str, category: CheckCategory) -> CircuitState {
        let breakers = self.breakers.read().await;
        breakers
            .get(&(host.to_string(), category))
            .map(|s| s.state)
            .unwrap_or(CircuitState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            cooldown_base: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn five_failures_trip_the_breaker() {
        let registry = BreakerRegistry::new(fast_config());
        for _ in 0..4 {
            let _ = registry.acquire("h", CheckCategory::Headers).await.unwrap();
            registry.record("h", CheckCategory::Headers, false).await;
            assert_eq!(
                registry.state("h", CheckCategory::Headers).await,
                CircuitState::Closed
            );
        }
        let _ = registry.acquire("h", CheckCategory::Headers).await.unwrap();
        registry.record("h", CheckCategory::Headers, false).await;
        assert_eq!(
            registry.state("h", CheckCategory::Headers).await,
            CircuitState::Open
        );
        let err = registry.acquire("h", CheckCategory::Headers).await.unwrap_err();
        assert_eq!(err.kind(), "breaker_open");
    }

    #[tokio::test]
    async fn categories_are_independent() {
        let registry = BreakerRegistry::new(fast_config());
        for _ in 0..5 {
            let _ = registry.acquire("h", CheckCategory::Tls).await.unwrap();
            registry.record("h", CheckCategory::Tls, false).await;
        }
        assert_eq!(
            registry.state("h", CheckCategory::Tls).await,
            CircuitState::Open
        );
        assert!(registry.acquire("h", CheckCategory::Headers).await.is_ok());
    }

    #[tokio::test]
    async fn half_open_permits_single_probe_and_success_closes() {
        let registry = BreakerRegistry::new(fast_config());
        for _ in 0..5 {
            let _ = registry.acquire("h", CheckCategory::Transport).await.unwrap();
            registry.record("h", CheckCategory::Transport, false).await;
        }
        tokio::time::sleep(Duration::from_millis(70)).await;

        // First admission is the probe; concurrent callers are rejected.
        let _probe = registry.acquire("h", CheckCategory::Transport).await.unwrap();
        assert_eq!(
            registry.state("h", CheckCategory::Transport).await,
            CircuitState::HalfOpen
        );
        assert!(registry.acquire("h", CheckCategory::Transport).await.is_err());

        registry.record("h", CheckCategory::Transport, true).await;
        assert_eq!(
            registry.state("h", CheckCategory::Transport).await,
            CircuitState::Closed
        );
        // Counters are reset: a single failure after recovery does not trip
        let _ = registry.acquire("h", CheckCategory::Transport).await.unwrap();
        registry.record("h", CheckCategory::Transport, false).await;
        assert_eq!(
            registry.state("h", CheckCategory::Transport).await,
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn failed_probe_reopens_with_longer_cooldown() {
        let registry = BreakerRegistry::new(fast_config());
        for _ in 0..5 {
            let _ = registry.acquire("h", CheckCategory::Dns).await.unwrap();
            registry.record("h", CheckCategory::Dns, false).await;
        }
        tokio::time::sleep(Duration::from_millis(70)).await;
        let _probe = registry.acquire("h", CheckCategory::Dns).await.unwrap();
        registry.record("h", CheckCategory::Dns, false).await;
        assert_eq!(
            registry.state("h", CheckCategory::Dns).await,
            CircuitState::Open
        );
        // Doubled cooldown: 100ms now, so a probe at +70ms is still rejected
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(registry.acquire("h", CheckCategory::Dns).await.is_err());
    }

    #[tokio::test]
    async fn successes_keep_breaker_closed() {
        let registry = BreakerRegistry::new(fast_config());
        for _ in 0..50 {
            let _ = registry.acquire("h", CheckCategory::Content).await.unwrap();
            registry.record("h", CheckCategory::Content, true).await;
        }
        assert_eq!(
            registry.state("h", CheckCategory::Content).await,
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn abandoned_probe_releases_the_half_open_slot() {
        let registry = BreakerRegistry::new(fast_config());
        for _ in 0..5 {
            let _ = registry.acquire("h", CheckCategory::Headers).await.unwrap();
            registry.record("h", CheckCategory::Headers, false).await;
        }
        tokio::time::sleep(Duration::from_millis(70)).await;

        // The probe's attempt future is dropped before any outcome lands
        // (per-check timeout, audit abort). The slot must free up again.
        let probe = registry.acquire("h", CheckCategory::Headers).await.unwrap();
        assert!(registry.acquire("h", CheckCategory::Headers).await.is_err());
        drop(probe);

        let _probe = registry.acquire("h", CheckCategory::Headers).await.unwrap();
        registry.record("h", CheckCategory::Headers, true).await;
        assert_eq!(
            registry.state("h", CheckCategory::Headers).await,
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn settled_probe_permit_cannot_release_a_later_probe() {
        let registry = BreakerRegistry::new(fast_config());
        for _ in 0..5 {
            let _ = registry.acquire("h", CheckCategory::Tls).await.unwrap();
            registry.record("h", CheckCategory::Tls, false).await;
        }
        tokio::time::sleep(Duration::from_millis(70)).await;

        // First probe fails and re-opens; its permit outlives the outcome
        let stale = registry.acquire("h", CheckCategory::Tls).await.unwrap();
        registry.record("h", CheckCategory::Tls, false).await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        // Second probe is in flight; dropping the stale permit must not
        // open its slot to a concurrent caller
        let _probe = registry.acquire("h", CheckCategory::Tls).await.unwrap();
        drop(stale);
        assert!(registry.acquire("h", CheckCategory::Tls).await.is_err());
    }
}
