// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - External Collaborator Interfaces
 * Narrow traits for the durable stores and push channels the engine uses,
 * plus in-memory implementations for tests and the CLI
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::cache::CacheEntry;
use crate::errors::AuditError;
use crate::types::{AuditReport, CreditHold, HoldStatus, ProgressEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Durable, read-after-write report persistence
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn put(&self, report: &AuditReport) -> Result<(), AuditError>;
    async fn get(&self, report_id: &str) -> Result<Option<AuditReport>, AuditError>;
}

/// Durable L2 cache tier; eventual consistency is acceptable
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, AuditError>;
    async fn put(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), AuditError>;
}

/// Billing collaborator; all operations are idempotent by hold_id
#[async_trait]
pub trait CreditService: Send + Sync {
    /// Create or confirm a hold. Re-reserving an existing held hold_id is a
    /// no-op returning the same hold.
    async fn reserve(
        &self,
        hold_id: &str,
        user_id: &str,
        amount: u32,
    ) -> Result<CreditHold, AuditError>;

    /// Commit `actual <= held`; the remainder is refunded atomically.
    /// Terminal holds reject with `AlreadyTerminal`.
    async fn commit(&self, hold_id: &str, actual: u32) -> Result<CreditHold, AuditError>;

    /// Refund the full hold. Refund after commit is a no-op; a second
    /// refund returns `AlreadyTerminal`.
    async fn refund(&self, hold_id: &str) -> Result<CreditHold, AuditError>;
}

/// Durable, ordered progress log; the source of truth for progress
#[async_trait]
pub trait ProgressLog: Send + Sync {
    async fn append(&self, event: &ProgressEvent) -> Result<(), AuditError>;
    /// Events with sequence > after, in order; supports subscriber resume
    async fn read_from(
        &self,
        correlation_id: &str,
        after: u64,
    ) -> Result<Vec<ProgressEvent>, AuditError>;
}

/// Best-effort push channel; delivery may be dropped
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    async fn publish(&self, event: &ProgressEvent);
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryReportStore {
    reports: RwLock<HashMap<String, AuditReport>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn put(&self, report: &AuditReport) -> Result<(), AuditError> {
        self.reports
            .write()
            .await
            .insert(report.report_id.clone(), report.clone());
        Ok(())
    }

    async fn get(&self, report_id: &str) -> Result<Option<AuditReport>, AuditError> {
        Ok(self.reports.read().await.get(report_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, AuditError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: &CacheEntry, _ttl: Duration) -> Result<(), AuditError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), entry.clone());
        Ok(())
    }
}

/// Conditional-write credit ledger with the same terminal-state semantics
/// the production billing tables enforce
#[derive(Default)]
pub struct MemoryCreditService {
    holds: RwLock<HashMap<String, CreditHold>>,
}

impl MemoryCreditService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn hold(&self, hold_id: &str) -> Option<CreditHold> {
        self.holds.read().await.get(hold_id).cloned()
    }
}

#[async_trait]
impl CreditService for MemoryCreditService {
    async fn reserve(
        &self,
        hold_id: &str,
        user_id: &str,
        amount: u32,
    ) -> Result<CreditHold, AuditError> {
        let mut holds = self.holds.write().await;
        if let Some(existing) = holds.get(hold_id) {
            if existing.status != HoldStatus::Held {
                return Err(AuditError::AlreadyTerminal {
                    hold_id: hold_id.to_string(),
                });
            }
            return Ok(existing.clone());
        }
        let hold = CreditHold {
            hold_id: hold_id.to_string(),
            user_id: user_id.to_string(),
            amount,
            status: HoldStatus::Held,
            committed: 0,
            refunded: 0,
        };
        holds.insert(hold_id.to_string(), hold.clone());
        debug!("reserved {} credits under hold {}", amount, hold_id);
        Ok(hold)
    }

    async fn commit(&self, hold_id: &str, actual: u32) -> Result<CreditHold, AuditError> {
        let mut holds = self.holds.write().await;
        let hold = holds
            .get_mut(hold_id)
            .ok_or_else(|| AuditError::Internal(format!("unknown hold {}", hold_id)))?;
        if hold.status != HoldStatus::Held {
            return Err(AuditError::AlreadyTerminal {
                hold_id: hold_id.to_string(),
            });
        }
        let actual = actual.min(hold.amount);
        hold.status = HoldStatus::Committed;
        hold.committed = actual;
        hold.refunded = hold.amount - actual;
        debug!(
            "committed {} and refunded {} of hold {}",
            hold.committed, hold.refunded, hold_id
        );
        Ok(hold.clone())
    }

    async fn refund(&self, hold_id: &str) -> Result<CreditHold, AuditError> {
        let mut holds = self.holds.write().await;
        let hold = holds
            .get_mut(hold_id)
            .ok_or_else(|| AuditError::Internal(format!("unknown hold {}", hold_id)))?;
        match hold.status {
            HoldStatus::Held => {
                hold.status = HoldStatus::Refunded;
                hold.refunded = hold.amount;
                debug!("refunded full hold {}", hold_id);
                Ok(hold.clone())
            }
            // Refund after commit is a no-op by contract
            HoldStatus::Committed => Ok(hold.clone()),
            HoldStatus::Refunded => Err(AuditError::AlreadyTerminal {
                hold_id: hold_id.to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct MemoryProgressLog {
    events: RwLock<HashMap<String, Vec<ProgressEvent>>>,
}

impl MemoryProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self, correlation_id: &str) -> Vec<ProgressEvent> {
        self.events
            .read()
            .await
            .get(correlation_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProgressLog for MemoryProgressLog {
    async fn append(&self, event: &ProgressEvent) -> Result<(), AuditError> {
        self.events
            .write()
            .await
            .entry(event.correlation_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn read_from(
        &self,
        correlation_id: &str,
        after: u64,
    ) -> Result<Vec<ProgressEvent>, AuditError> {
        Ok(self
            .events
            .read()
            .await
            .get(correlation_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.sequence > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Broadcast-backed push channel; lagging or absent subscribers lose events
pub struct MemoryProgressChannel {
    sender: tokio::sync::broadcast::Sender<ProgressEvent>,
}

impl Default for MemoryProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProgressChannel {
    pub fn new() -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(256);
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl ProgressChannel for MemoryProgressChannel {
    async fn publish(&self, event: &ProgressEvent) {
        // No receivers is fine; push delivery is best-effort
        let _ = self.sender.send(event.clone());
    }
}

/// Bundle of collaborator handles the engine is constructed with
#[derive(Clone)]
pub struct Collaborators {
    pub reports: Arc<dyn ReportStore>,
    pub cache: Arc<dyn CacheStore>,
    pub credits: Arc<dyn CreditService>,
    pub progress_log: Arc<dyn ProgressLog>,
    pub progress_channel: Arc<dyn ProgressChannel>,
}

impl Collaborators {
    /// All-in-memory wiring used by the CLI and the test suite
    pub fn in_memory() -> Self {
        Self {
            reports: Arc::new(MemoryReportStore::new()),
            cache: Arc::new(MemoryCacheStore::new()),
            credits: Arc::new(MemoryCreditService::new()),
            progress_log: Arc::new(MemoryProgressLog::new()),
            progress_channel: Arc::new(MemoryProgressChannel::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_refunds_remainder() {
        let credits = MemoryCreditService::new();
        credits.reserve("h1", "u1", 10).await.unwrap();
        let hold = credits.commit("h1", 7).await.unwrap();
        assert_eq!(hold.committed, 7);
        assert_eq!(hold.refunded, 3);
        assert_eq!(hold.committed + hold.refunded, hold.amount);
    }

    #[tokio::test]
    async fn reserve_is_idempotent_by_hold_id() {
        let credits = MemoryCreditService::new();
        let first = credits.reserve("h1", "u1", 10).await.unwrap();
        let second = credits.reserve("h1", "u1", 10).await.unwrap();
        assert_eq!(first.hold_id, second.hold_id);
        assert_eq!(second.status, HoldStatus::Held);
    }

    #[tokio::test]
    async fn double_commit_is_rejected() {
        let credits = MemoryCreditService::new();
        credits.reserve("h1", "u1", 10).await.unwrap();
        credits.commit("h1", 10).await.unwrap();
        let err = credits.commit("h1", 10).await.unwrap_err();
        assert_eq!(err.kind(), "already_terminal");
    }

    #[tokio::test]
    async fn refund_after_commit_is_noop() {
        let credits = MemoryCreditService::new();
        credits.reserve("h1", "u1", 10).await.unwrap();
        credits.commit("h1", 4).await.unwrap();
        let hold = credits.refund("h1").await.unwrap();
        assert_eq!(hold.status, HoldStatus::Committed);
        assert_eq!(hold.committed, 4);
    }

    #[tokio::test]
    async fn double_refund_is_rejected() {
        let credits = MemoryCreditService::new();
        credits.reserve("h1", "u1", 10).await.unwrap();
        credits.refund("h1").await.unwrap();
        assert_eq!(
            credits.refund("h1").await.unwrap_err().kind(),
            "already_terminal"
        );
    }
}
