// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Engine Configuration
 * Environment-driven configuration for the audit engine
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use std::time::Duration;

/// Read an env var and parse it, falling back to a default
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Engine-wide configuration, constructed once at startup
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded worker pool size per audit (ENGINE_CONCURRENCY)
    pub concurrency: usize,

    /// Token bucket refill rate per origin (PER_HOST_RPS); 0 blocks all
    /// outbound calls, which is the test mode
    pub per_host_rps: u32,

    /// Max idle pooled connections per origin (PER_HOST_POOL)
    pub per_host_pool: usize,

    /// Global audit deadline (GLOBAL_AUDIT_TIMEOUT_MS)
    pub global_audit_timeout: Duration,

    /// L1 cache capacity in entries (L1_CACHE_SIZE)
    pub l1_cache_size: u64,

    /// Sliding window of outcomes per breaker (BREAKER_WINDOW_SIZE)
    pub breaker_window_size: usize,

    /// Failure rate that trips a breaker (BREAKER_TRIP_THRESHOLD)
    pub breaker_trip_threshold: f64,

    /// Minimum failures in the window before tripping
    pub breaker_min_failures: usize,

    /// Base open-state cooldown (BREAKER_COOLDOWN_BASE_MS); doubles per
    /// consecutive open cycle, capped at 5 minutes
    pub breaker_cooldown_base: Duration,
    pub breaker_cooldown_cap: Duration,

    /// Per-attempt connect timeout (CONNECT_TIMEOUT_MS)
    pub connect_timeout: Duration,

    /// Per-attempt read timeout (READ_TIMEOUT_MS)
    pub read_timeout: Duration,

    /// Transport retry budget (MAX_ATTEMPTS); 1 disables retries
    pub max_attempts: u32,

    /// Waiters allowed behind a saturated per-host bucket (RATE_QUEUE_DEPTH)
    pub rate_queue_depth: usize,

    /// Idle pooled connection eviction
    pub pool_idle_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            per_host_rps: 4,
            per_host_pool: 32,
            global_audit_timeout: Duration::from_millis(90_000),
            l1_cache_size: 2048,
            breaker_window_size: 20,
            breaker_trip_threshold: 0.5,
            breaker_min_failures: 5,
            breaker_cooldown_base: Duration::from_millis(10_000),
            breaker_cooldown_cap: Duration::from_secs(300),
            connect_timeout: Duration::from_millis(10_000),
            read_timeout: Duration::from_millis(15_000),
            max_attempts: 3,
            rate_queue_depth: 32,
            pool_idle_ttl: Duration::from_secs(90),
        }
    }
}

impl EngineConfig {
    /// Build configuration from the environment, with production defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse("ENGINE_CONCURRENCY", defaults.concurrency),
            per_host_rps: env_parse("PER_HOST_RPS", defaults.per_host_rps),
            per_host_pool: env_parse("PER_HOST_POOL", defaults.per_host_pool),
            global_audit_timeout: Duration::from_millis(env_parse(
                "GLOBAL_AUDIT_TIMEOUT_MS",
                defaults.global_audit_timeout.as_millis() as u64,
            )),
            l1_cache_size: env_parse("L1_CACHE_SIZE", defaults.l1_cache_size),
            breaker_window_size: env_parse("BREAKER_WINDOW_SIZE", defaults.breaker_window_size),
            breaker_trip_threshold: env_parse(
                "BREAKER_TRIP_THRESHOLD",
                defaults.breaker_trip_threshold,
            ),
            breaker_min_failures: defaults.breaker_min_failures,
            breaker_cooldown_base: Duration::from_millis(env_parse(
                "BREAKER_COOLDOWN_BASE_MS",
                defaults.breaker_cooldown_base.as_millis() as u64,
            )),
            breaker_cooldown_cap: defaults.breaker_cooldown_cap,
            connect_timeout: Duration::from_millis(env_parse(
                "CONNECT_TIMEOUT_MS",
                defaults.connect_timeout.as_millis() as u64,
            )),
            read_timeout: Duration::from_millis(env_parse(
                "READ_TIMEOUT_MS",
                defaults.read_timeout.as_millis() as u64,
            )),
            max_attempts: env_parse("MAX_ATTEMPTS", defaults.max_attempts),
            rate_queue_depth: env_parse("RATE_QUEUE_DEPTH", defaults.rate_queue_depth),
            pool_idle_ttl: defaults.pool_idle_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.per_host_rps, 4);
        assert_eq!(config.global_audit_timeout, Duration::from_secs(90));
        assert_eq!(config.l1_cache_size, 2048);
        assert_eq!(config.breaker_window_size, 20);
        assert_eq!(config.breaker_min_failures, 5);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.rate_queue_depth, 32);
    }
}
