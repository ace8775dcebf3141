// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Progress Tracker
 * Ordered, correlation-tagged progress stream with durable logging
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::errors::AuditError;
use crate::stores::{ProgressChannel, ProgressLog};
use crate::types::{now_rfc3339_millis, ProgressEvent, ProgressPhase, ProgressState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Terminal view of a progress stream, reconstructible from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub correlation_id: String,
    pub last_sequence: u64,
    pub percent: u8,
    pub phase: ProgressPhase,
    pub state: ProgressState,
}

#[derive(Debug)]
struct CorrelationState {
    next_sequence: u64,
    last_percent: u8,
    finished: bool,
}

/// Assigns gap-free sequence numbers per correlation, clamps percent to be
/// monotonically non-decreasing, writes durably, then pushes best-effort.
///
/// The durable append is the source of truth: if it fails the emit fails.
/// Push delivery failures are logged and swallowed.
pub struct ProgressTracker {
    log: Arc<dyn ProgressLog>,
    channel: Arc<dyn ProgressChannel>,
    correlations: Mutex<HashMap<String, CorrelationState>>,
}

impl ProgressTracker {
    pub fn new(log: Arc<dyn ProgressLog>, channel: Arc<dyn ProgressChannel>) -> Self {
        Self {
            log,
            channel,
            correlations: Mutex::new(HashMap::new()),
        }
    }

    /// Open a progress stream. Re-opening an unfinished stream is a no-op;
    /// re-opening a finished one is rejected.
    pub async fn start(&self, correlation_id: &str) -> Result<(), AuditError> {
        let mut correlations = self.correlations.lock().await;
        match correlations.get(correlation_id) {
            Some(state) if state.finished => Err(AuditError::Internal(format!(
                "progress stream {} already finished",
                correlation_id
            ))),
            Some(_) => Ok(()),
            None => {
                correlations.insert(
                    correlation_id.to_string(),
                    CorrelationState {
                        next_sequence: 1,
                        last_percent: 0,
                        finished: false,
                    },
                );
                Ok(())
            }
        }
    }

    /// Emit one event. Sequence assignment and the durable append happen
    /// under the correlation lock so the log order matches the sequence
    /// order; a regressing percent is rewritten to the last emitted value.
    pub async fn emit(
        &self,
        correlation_id: &str,
        phase: ProgressPhase,
        state: ProgressState,
        check_id: Option<&str>,
        percent: u8,
        detail: &str,
    ) -> Result<ProgressEvent, AuditError> {
        let mut correlations = self.correlations.lock().await;
        let correlation = correlations.get_mut(correlation_id).ok_or_else(|| {
            AuditError::Internal(format!("progress stream {} not started", correlation_id))
        })?;
        if correlation.finished {
            return Err(AuditError::Internal(format!(
                "progress stream {} already finished",
                correlation_id
            )));
        }

        let clamped = percent.min(100).max(correlation.last_percent);
        let event = ProgressEvent {
            correlation_id: correlation_id.to_string(),
            sequence: correlation.next_sequence,
            phase,
            check_id: check_id.map(|s| s.to_string()),
            state,
            percent: clamped,
            detail: detail.to_string(),
            emitted_at: now_rfc3339_millis(),
        };

        self.log.append(&event).await?;
        correlation.next_sequence += 1;
        correlation.last_percent = clamped;

        if matches!(state, ProgressState::Completed | ProgressState::Failed)
            && phase == ProgressPhase::Finalizing
        {
            correlation.finished = true;
        }
        drop(correlations);

        debug!(
            correlation_id = %event.correlation_id,
            sequence = event.sequence,
            percent = event.percent,
            "progress {:?}/{:?} {}",
            event.phase, event.state, event.detail
        );
        self.channel.publish(&event).await;
        Ok(event)
    }

    /// Write the terminal snapshot event and seal the stream
    pub async fn finish(
        &self,
        correlation_id: &str,
        state: ProgressState,
        detail: &str,
    ) -> Result<ProgressEvent, AuditError> {
        if !matches!(state, ProgressState::Completed | ProgressState::Failed) {
            return Err(AuditError::Internal(
                "terminal progress state must be completed or failed".into(),
            ));
        }
        let percent = if state == ProgressState::Completed { 100 } else { 0 };
        let event = self
            .emit(
                correlation_id,
                ProgressPhase::Finalizing,
                state,
                None,
                percent,
                detail,
            )
            .await;
        if let Err(ref err) = event {
            warn!(
                "failed to finalize progress stream {}: {}",
                correlation_id, err
            );
        }
        event
    }
}

/// Reduce an ordered event slice to its terminal snapshot; used by
/// subscribers resuming from the durable log
pub fn replay(events: &[ProgressEvent]) -> Option<ProgressSnapshot> {
    let last = events.last()?;
    Some(ProgressSnapshot {
        correlation_id: last.correlation_id.clone(),
        last_sequence: last.sequence,
        percent: events.iter().map(|e| e.percent).max().unwrap_or(0),
        phase: last.phase,
        state: last.state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{MemoryProgressChannel, MemoryProgressLog};

    fn tracker() -> (ProgressTracker, Arc<MemoryProgressLog>) {
        let log = Arc::new(MemoryProgressLog::new());
        let channel = Arc::new(MemoryProgressChannel::new());
        (ProgressTracker::new(log.clone(), channel), log)
    }

    #[tokio::test]
    async fn sequences_are_gap_free_and_increasing() {
        let (tracker, log) = tracker();
        tracker.start("c1").await.unwrap();
        for i in 0..5u8 {
            tracker
                .emit(
                    "c1",
                    ProgressPhase::Checking,
                    ProgressState::Advanced,
                    Some("hsts"),
                    i * 10,
                    "step",
                )
                .await
                .unwrap();
        }
        let events = log.all("c1").await;
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn percent_is_clamped_monotonic() {
        let (tracker, log) = tracker();
        tracker.start("c1").await.unwrap();
        for percent in [10u8, 40, 25, 80] {
            tracker
                .emit(
                    "c1",
                    ProgressPhase::Checking,
                    ProgressState::Advanced,
                    None,
                    percent,
                    "step",
                )
                .await
                .unwrap();
        }
        let percents: Vec<u8> = log.all("c1").await.iter().map(|e| e.percent).collect();
        assert_eq!(percents, vec![10, 40, 40, 80]);
    }

    #[tokio::test]
    async fn emit_after_finish_is_rejected() {
        let (tracker, _) = tracker();
        tracker.start("c1").await.unwrap();
        tracker
            .finish("c1", ProgressState::Completed, "done")
            .await
            .unwrap();
        let err = tracker
            .emit(
                "c1",
                ProgressPhase::Checking,
                ProgressState::Advanced,
                None,
                50,
                "late",
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "internal");
    }

    #[tokio::test]
    async fn terminal_event_is_finalizing() {
        let (tracker, log) = tracker();
        tracker.start("c1").await.unwrap();
        tracker
            .emit(
                "c1",
                ProgressPhase::Setup,
                ProgressState::Started,
                None,
                0,
                "setup",
            )
            .await
            .unwrap();
        tracker
            .finish("c1", ProgressState::Failed, "cancelled")
            .await
            .unwrap();
        let events = log.all("c1").await;
        let last = events.last().unwrap();
        assert_eq!(last.phase, ProgressPhase::Finalizing);
        assert_eq!(last.state, ProgressState::Failed);
    }

    #[tokio::test]
    async fn replay_matches_live_snapshot() {
        let (tracker, log) = tracker();
        tracker.start("c1").await.unwrap();
        tracker
            .emit("c1", ProgressPhase::Setup, ProgressState::Started, None, 0, "setup")
            .await
            .unwrap();
        tracker
            .emit(
                "c1",
                ProgressPhase::Checking,
                ProgressState::Advanced,
                Some("csp"),
                55,
                "csp done",
            )
            .await
            .unwrap();
        let terminal = tracker
            .finish("c1", ProgressState::Completed, "done")
            .await
            .unwrap();

        let snapshot = replay(&log.all("c1").await).unwrap();
        assert_eq!(snapshot.last_sequence, terminal.sequence);
        assert_eq!(snapshot.percent, 100);
        assert_eq!(snapshot.phase, ProgressPhase::Finalizing);
        assert_eq!(snapshot.state, ProgressState::Completed);
    }

    #[tokio::test]
    async fn subscribers_can_resume_from_sequence() {
        let (tracker, log) = tracker();
        tracker.start("c1").await.unwrap();
        for i in 0..4u8 {
            tracker
                .emit(
                    "c1",
                    ProgressPhase::Checking,
                    ProgressState::Advanced,
                    None,
                    i * 20,
                    "step",
                )
                .await
                .unwrap();
        }
        let resumed = log.read_from("c1", 2).await.unwrap();
        assert_eq!(resumed.len(), 2);
        assert_eq!(resumed[0].sequence, 3);
    }
}
