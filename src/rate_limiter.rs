// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Per-Origin Rate Limiter
 * Token bucket per origin with a bounded wait queue
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::errors::AuditError;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tracing::debug;

type OriginLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct OriginState {
    limiter: Arc<OriginLimiter>,
    /// Bounds the number of callers parked behind the bucket
    queue: Arc<Semaphore>,
}

/// Per-origin token bucket limiter shared by all audits in a process.
///
/// An origin is `scheme://host:port`. A saturated queue fails fast with
/// `RateLimited`, which the transport treats as retryable. An `rps` of 0
/// blocks every outbound call; tests use that to assert nothing leaks out.
pub struct HostRateLimiter {
    origins: RwLock<HashMap<String, Arc<OriginState>>>,
    rps: u32,
    queue_depth: usize,
}

impl HostRateLimiter {
    pub fn new(rps: u32, queue_depth: usize) -> Self {
        Self {
            origins: RwLock::new(HashMap::new()),
            rps,
            queue_depth: queue_depth.max(1),
        }
    }

    async fn origin_state(&self, origin: &str) -> Option<Arc<OriginState>> {
        {
            let origins = self.origins.read().await;
            if let Some(state) = origins.get(origin) {
                return Some(state.clone());
            }
        }
        let rate = NonZeroU32::new(self.rps)?;
        let mut origins = self.origins.write().await;
        let state = origins
            .entry(origin.to_string())
            .or_insert_with(|| {
                debug!("rate limiter created for {} at {} rps", origin, self.rps);
                Arc::new(OriginState {
                    limiter: Arc::new(GovernorRateLimiter::direct(Quota::per_second(rate))),
                    queue: Arc::new(Semaphore::new(self.queue_depth)),
                })
            })
            .clone();
        Some(state)
    }

    /// Wait for a token for `origin`, or fail with `RateLimited` when the
    /// bucket is blocked (rps=0) or the wait queue is full.
    pub async fn acquire(&self, origin: &str) -> Result<(), AuditError> {
        let state = match self.origin_state(origin).await {
            Some(state) => state,
            // rps == 0: outbound calls disabled
            None => {
                return Err(AuditError::RateLimited {
                    origin: origin.to_string(),
                })
            }
        };

        let _slot = state.queue.clone().try_acquire_owned().map_err(|_| {
            debug!("rate limit queue saturated for {}", origin);
            AuditError::RateLimited {
                origin: origin.to_string(),
            }
        })?;

        state.limiter.until_ready().await;
        Ok(())
    }
}
