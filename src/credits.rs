// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Credit Guard
 * Reserve/commit/refund lifecycle around each audit
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::errors::AuditError;
use crate::stores::CreditService;
use crate::types::CreditHold;
use std::sync::Arc;
use tracing::{info, warn};

/// Wraps the billing collaborator with the engine's settlement rules.
///
/// The request handlers pre-allocate a hold id; `reserve` confirms it for
/// the computed cost (idempotent). Settlement commits what was actually
/// spent and refunds the remainder; any failure path refunds in full.
pub struct CreditGuard {
    service: Arc<dyn CreditService>,
}

impl CreditGuard {
    pub fn new(service: Arc<dyn CreditService>) -> Self {
        Self { service }
    }

    pub async fn reserve(
        &self,
        hold_id: &str,
        user_id: &str,
        amount: u32,
    ) -> Result<CreditHold, AuditError> {
        let hold = self.service.reserve(hold_id, user_id, amount).await?;
        info!(
            "[Credits] reserved {} units under hold {} for {}",
            hold.amount, hold.hold_id, user_id
        );
        Ok(hold)
    }

    /// Commit the spent portion; the service refunds the rest atomically
    pub async fn settle(&self, hold_id: &str, actual: u32) -> Result<CreditHold, AuditError> {
        let hold = self.service.commit(hold_id, actual).await?;
        info!(
            "[Credits] settled hold {}: committed {} refunded {}",
            hold_id, hold.committed, hold.refunded
        );
        Ok(hold)
    }

    /// Full refund on unrecoverable failure or cancellation. Terminal holds
    /// are left untouched; the error is logged, never propagated, so refund
    /// paths cannot mask the original failure.
    pub async fn refund_all(&self, hold_id: &str) {
        match self.service.refund(hold_id).await {
            Ok(hold) => info!(
                "[Credits] refunded hold {}: {} units",
                hold_id, hold.refunded
            ),
            Err(AuditError::AlreadyTerminal { .. }) => {}
            Err(err) => warn!("[Credits] refund of hold {} failed: {}", hold_id, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryCreditService;
    use crate::types::HoldStatus;

    #[tokio::test]
    async fn settle_conserves_credits() {
        let service = Arc::new(MemoryCreditService::new());
        let guard = CreditGuard::new(service.clone());
        guard.reserve("h1", "u1", 12).await.unwrap();
        let hold = guard.settle("h1", 9).await.unwrap();
        assert_eq!(hold.committed + hold.refunded, 12);
    }

    #[tokio::test]
    async fn refund_all_is_quiet_after_settlement() {
        let service = Arc::new(MemoryCreditService::new());
        let guard = CreditGuard::new(service.clone());
        guard.reserve("h1", "u1", 12).await.unwrap();
        guard.settle("h1", 12).await.unwrap();
        guard.refund_all("h1").await;
        let hold = service.hold("h1").await.unwrap();
        assert_eq!(hold.status, HoldStatus::Committed);
        assert_eq!(hold.committed, 12);
    }
}
