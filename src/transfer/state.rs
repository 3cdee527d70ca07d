use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::chunk::ChunkStateKind;

use super::error::{Result, TransferError};
use super::types::{Transfer, TransferEvent, TransferSnapshot, TransferStatus};

/// Single point of truth for one transfer's state (spec.md §4.2). All
/// mutation goes through `transition`, serialized by the inner mutex;
/// external observers only ever see `TransferSnapshot`s.
pub struct TransferHandle {
    inner: Mutex<Transfer>,
    observers: mpsc::Sender<TransferSnapshot>,
}

impl TransferHandle {
    pub fn new(transfer: Transfer, observers: mpsc::Sender<TransferSnapshot>) -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(transfer), observers })
    }

    pub fn transfer_id(&self) -> String {
        self.inner.lock().transfer_id.clone()
    }

    pub fn object_id(&self) -> String {
        self.inner.lock().object_id.clone()
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        self.inner.lock().snapshot(Instant::now())
    }

    /// Indices of chunks the scheduler may bind to a lane right now: still
    /// `Pending`, or `Failed` with attempts left (spec.md §4.3.1).
    pub fn runnable_chunks(&self) -> Vec<u32> {
        self.inner
            .lock()
            .chunk_states
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_runnable())
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Mark a chunk bound to a lane so it isn't offered to the scheduler
    /// again while the dispatch attempt is outstanding.
    pub fn mark_chunk_in_flight(&self, index: u32, lane: u32) {
        let mut transfer = self.inner.lock();
        if let Some(state) = transfer.chunk_states.get_mut(index as usize) {
            state.kind = ChunkStateKind::InFlight;
            state.assigned_lane = Some(lane);
            state.last_attempt_at = Some(Utc::now());
        }
    }

    pub fn mark_chunk_acknowledged(&self, index: u32) {
        let mut transfer = self.inner.lock();
        if let Some(state) = transfer.chunk_states.get_mut(index as usize) {
            state.kind = ChunkStateKind::Acknowledged;
            state.assigned_lane = None;
        }
    }

    /// Record a failed delivery attempt and return the chunk's new attempt
    /// count, for the caller to pass on to `RetryEngine::on_failure`.
    pub fn mark_chunk_failed(&self, index: u32) -> u32 {
        let mut transfer = self.inner.lock();
        match transfer.chunk_states.get_mut(index as usize) {
            Some(state) => {
                state.attempts += 1;
                state.kind = ChunkStateKind::Failed;
                state.assigned_lane = None;
                state.last_attempt_at = Some(Utc::now());
                state.attempts
            }
            None => 0,
        }
    }

    pub fn mark_chunk_abandoned(&self, index: u32) {
        let mut transfer = self.inner.lock();
        if let Some(state) = transfer.chunk_states.get_mut(index as usize) {
            state.kind = ChunkStateKind::Abandoned;
            state.assigned_lane = None;
        }
    }

    fn publish(&self, snapshot: TransferSnapshot) {
        let _ = self.observers.try_send(snapshot);
    }

    /// Apply one event to the FSM, matching (state, event) to the single
    /// next state or returning `InvalidTransition`.
    pub fn transition(&self, event: TransferEvent) -> Result<TransferStatus> {
        let mut transfer = self.inner.lock();
        let current = transfer.status.clone();

        let next = match (&current, &event) {
            (TransferStatus::Queued, TransferEvent::Admit) => TransferStatus::Scheduled,

            (TransferStatus::Scheduled, TransferEvent::FirstChunkDispatched) => {
                transfer.started_at = Some(Utc::now());
                TransferStatus::Initializing
            }

            (TransferStatus::Initializing, TransferEvent::ChunkAcknowledged { .. })
            | (TransferStatus::Transmitting, TransferEvent::ChunkAcknowledged { .. }) => {
                TransferStatus::Transmitting
            }

            (TransferStatus::Transmitting, TransferEvent::ChunkFailed { .. }) => TransferStatus::Transmitting,

            (TransferStatus::Transmitting, TransferEvent::EnterRetry) => TransferStatus::Retrying,
            (TransferStatus::Retrying, TransferEvent::RetryRecovered) => TransferStatus::Transmitting,
            (TransferStatus::Retrying, TransferEvent::RetryExhausted { reason }) => {
                TransferStatus::Failed(reason.clone())
            }

            (TransferStatus::Transmitting, TransferEvent::Pause) => TransferStatus::Paused,
            (TransferStatus::Paused, TransferEvent::Resume) => TransferStatus::Transmitting,

            (TransferStatus::Transmitting, TransferEvent::Sealed) => {
                transfer.completed_at = Some(Utc::now());
                TransferStatus::Completed
            }

            (_, TransferEvent::Cancel) if !current.is_terminal() => TransferStatus::Cancelled,

            _ => {
                return Err(TransferError::InvalidTransition {
                    state: format!("{current:?}"),
                    event: format!("{event:?}"),
                })
            }
        };

        if let TransferEvent::ChunkAcknowledged { bytes, .. } = &event {
            transfer.bytes_transmitted += bytes;
            transfer.throughput.record(*bytes, Instant::now());
        }

        transfer.status = next.clone();
        let snapshot = transfer.snapshot(Instant::now());
        drop(transfer);

        match &next {
            TransferStatus::Failed(reason) => warn!(reason, "transfer failed"),
            TransferStatus::Completed => info!("transfer completed"),
            _ => {}
        }
        self.publish(snapshot);

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Priority;
    use crate::retry::{FecConfig, RetryPolicy};
    use crate::transfer::types::Direction;
    use crate::transport::TransportMode;

    fn handle() -> Arc<TransferHandle> {
        let (tx, _rx) = mpsc::channel(16);
        let transfer = Transfer::new(
            "t1".into(),
            "obj".into(),
            Direction::Download,
            Priority::Normal,
            4,
            4096,
            TransportMode::Rf,
            RetryPolicy::default(),
            FecConfig::default(),
        );
        TransferHandle::new(transfer, tx)
    }

    #[test]
    fn happy_path_through_to_completed() {
        let h = handle();
        h.transition(TransferEvent::Admit).unwrap();
        h.transition(TransferEvent::FirstChunkDispatched).unwrap();
        h.transition(TransferEvent::ChunkAcknowledged { index: 0, bytes: 1024 }).unwrap();
        let status = h.transition(TransferEvent::Sealed).unwrap();
        assert_eq!(status, TransferStatus::Completed);
    }

    #[test]
    fn cancel_from_any_nonterminal_state() {
        let h = handle();
        h.transition(TransferEvent::Admit).unwrap();
        let status = h.transition(TransferEvent::Cancel).unwrap();
        assert_eq!(status, TransferStatus::Cancelled);
    }

    #[test]
    fn pause_resume_roundtrip() {
        let h = handle();
        h.transition(TransferEvent::Admit).unwrap();
        h.transition(TransferEvent::FirstChunkDispatched).unwrap();
        h.transition(TransferEvent::ChunkAcknowledged { index: 0, bytes: 10 }).unwrap();
        h.transition(TransferEvent::Pause).unwrap();
        let status = h.transition(TransferEvent::Resume).unwrap();
        assert_eq!(status, TransferStatus::Transmitting);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let h = handle();
        let result = h.transition(TransferEvent::Pause);
        assert!(result.is_err());
    }

    #[test]
    fn retry_exhausted_fails_transfer() {
        let h = handle();
        h.transition(TransferEvent::Admit).unwrap();
        h.transition(TransferEvent::FirstChunkDispatched).unwrap();
        h.transition(TransferEvent::ChunkAcknowledged { index: 0, bytes: 10 }).unwrap();
        h.transition(TransferEvent::EnterRetry).unwrap();
        let status = h.transition(TransferEvent::RetryExhausted { reason: "abandon threshold exceeded".into() }).unwrap();
        assert!(matches!(status, TransferStatus::Failed(_)));
    }
}
