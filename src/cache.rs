// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Multi-Tier Result Cache
 * In-process moka L1 over a durable L2 store, with single-flight compute
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::errors::AuditError;
use crate::stores::CacheStore;
use crate::types::ENGINE_VERSION;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// A cached value with its validity window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub inserted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Cache key derived from check identity and audit input.
///
/// The engine version is part of the digest so releases never read each
/// other's entries. Authorization headers and per-request identifiers are
/// deliberately not inputs.
pub fn fingerprint(check_id: &str, target_host: &str, input_digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ENGINE_VERSION.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(check_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(target_host.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(input_digest.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Default)]
pub struct CacheMetrics {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub coalesced: u64,
}

/// Two-tier cache: moka L1 in front of a durable L2 `CacheStore`.
///
/// Concurrent `get_or_compute` calls for one fingerprint coalesce onto a
/// single computation; waiters receive the cached clone once the leader
/// publishes it.
pub struct MultiTierCache {
    l1: Cache<String, CacheEntry>,
    l2: Arc<dyn CacheStore>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    metrics: CacheMetrics,
}

impl MultiTierCache {
    pub fn new(l1_capacity: u64, l2: Arc<dyn CacheStore>) -> Self {
        Self {
            l1: Cache::builder().max_capacity(l1_capacity).build(),
            l2,
            inflight: Mutex::new(HashMap::new()),
            metrics: CacheMetrics::default(),
        }
    }

    /// Fresh lookup: L1, then L2 (promoting on hit), then miss
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.l1.get(key).await {
            if !entry.is_expired() {
                self.metrics.l1_hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry);
            }
            self.l1.invalidate(key).await;
        }
        match self.l2.get(key).await {
            Ok(Some(entry)) if !entry.is_expired() => {
                self.metrics.l2_hits.fetch_add(1, Ordering::Relaxed);
                self.l1.insert(key.to_string(), entry.clone()).await;
                Some(entry)
            }
            Ok(_) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(err) => {
                // L2 unavailability degrades to a miss, never an audit error
                debug!("L2 cache read failed for {}: {}", key, err);
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Like `get`, but an expired L1 entry may be served when the caller
    /// tolerates staleness
    pub async fn get_stale_ok(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.l1.get(key).await {
            if !entry.is_expired() {
                self.metrics.l1_hits.fetch_add(1, Ordering::Relaxed);
            }
            return Some(entry);
        }
        self.get(key).await
    }

    /// Write through to both tiers
    pub async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let now = Utc::now();
        let entry = CacheEntry {
            value,
            inserted_at: now,
            expires_at: now
                + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1)),
        };
        self.l1.insert(key.to_string(), entry.clone()).await;
        if let Err(err) = self.l2.put(key, &entry, ttl).await {
            debug!("L2 cache write failed for {}: {}", key, err);
        }
    }

    /// Single-flight read-through: at most one computation per fingerprint
    /// is in flight in this process; concurrent callers wait and then read
    /// the published value.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<(serde_json::Value, bool), AuditError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<serde_json::Value, AuditError>>,
    {
        if let Some(entry) = self.get(key).await {
            return Ok((entry.value, true));
        }

        let key_lock = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = {
            let _leader = key_lock.lock().await;
            // A leader may have published while this task waited
            if let Some(entry) = self.get(key).await {
                self.metrics.coalesced.fetch_add(1, Ordering::Relaxed);
                Ok((entry.value, true))
            } else {
                match compute().await {
                    Ok(value) => {
                        self.put(key, value.clone(), ttl).await;
                        Ok((value, false))
                    }
                    Err(err) => Err(err),
                }
            }
        };

        let mut inflight = self.inflight.lock().await;
        if inflight
            .get(key)
            .map(|lock| Arc::strong_count(lock) <= 2)
            .unwrap_or(false)
        {
            inflight.remove(key);
        }

        result
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_hits: self.metrics.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.metrics.l2_hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            coalesced: self.metrics.coalesced.load(Ordering::Relaxed),
        }
    }
}
