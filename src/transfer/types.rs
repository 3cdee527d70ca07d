use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkState, Priority};
use crate::retry::{FecConfig, RetryPolicy};
use crate::transport::TransportMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Upload,
    Download,
    Seed,
}

/// TransferState FSM (spec.md §4.2). `Failed` and `Cancelled` are terminal;
/// every other state can reach `Cancelled` via the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferStatus {
    Queued,
    Scheduled,
    Initializing,
    Transmitting,
    Paused,
    Retrying,
    Completed,
    Failed(String),
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed(_) | TransferStatus::Cancelled)
    }
}

/// Events driving the FSM, one per §4.2 transition source.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Admit,
    FirstChunkDispatched,
    ChunkAcknowledged { index: u32, bytes: u64 },
    ChunkFailed { index: u32 },
    EnterRetry,
    RetryRecovered,
    RetryExhausted { reason: String },
    Pause,
    Resume,
    Sealed,
    Cancel,
}

const THROUGHPUT_WINDOW: Duration = Duration::from_secs(10);

/// Sliding-window throughput tracker (spec.md §4.2).
#[derive(Debug, Default)]
pub struct ThroughputWindow {
    samples: VecDeque<(Instant, u64)>,
}

impl ThroughputWindow {
    pub fn record(&mut self, bytes: u64, now: Instant) {
        self.samples.push_back((now, bytes));
        self.evict(now);
    }

    fn evict(&mut self, now: Instant) {
        while let Some((t, _)) = self.samples.front() {
            if now.duration_since(*t) > THROUGHPUT_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bytes/sec over the window, or `None` until at least one second of
    /// data has accumulated.
    pub fn throughput_bps(&self, now: Instant) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let span = now.duration_since(self.samples.front().unwrap().0).as_secs_f64();
        if span < 1.0 {
            return None;
        }
        let total: u64 = self.samples.iter().map(|(_, b)| b).sum();
        Some(total as f64 / span)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSnapshot {
    pub transfer_id: String,
    pub object_id: String,
    pub direction: Direction,
    pub priority: Priority,
    pub status: TransferStatus,
    pub bytes_transmitted: u64,
    pub total_bytes: u64,
    pub progress: f32,
    pub throughput_bps: Option<f64>,
    pub estimated_seconds_remaining: Option<f64>,
    pub abandoned_chunks: u32,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A directional move of one object between the local station and a peer
/// (or set of peers) (spec.md §3). Owns its `chunk_states` exclusively.
pub struct Transfer {
    pub transfer_id: String,
    pub object_id: String,
    pub direction: Direction,
    pub priority: Priority,
    pub status: TransferStatus,
    pub peer_set: Vec<String>,
    pub mode: TransportMode,
    pub allocated_bandwidth: u32,
    pub chunk_states: Vec<ChunkState>,
    pub total_bytes: u64,
    pub bytes_transmitted: u64,
    pub throughput: ThroughputWindow,
    pub retry_policy: RetryPolicy,
    pub fec_config: FecConfig,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    pub fn new(
        transfer_id: String,
        object_id: String,
        direction: Direction,
        priority: Priority,
        total_chunks: u32,
        total_bytes: u64,
        mode: TransportMode,
        retry_policy: RetryPolicy,
        fec_config: FecConfig,
    ) -> Self {
        let max_attempts = retry_policy.max_attempts;
        Self {
            transfer_id,
            object_id,
            direction,
            priority,
            status: TransferStatus::Queued,
            peer_set: Vec::new(),
            mode,
            allocated_bandwidth: 0,
            chunk_states: (0..total_chunks).map(|_| ChunkState::new(max_attempts)).collect(),
            total_bytes,
            bytes_transmitted: 0,
            throughput: ThroughputWindow::default(),
            retry_policy,
            fec_config,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Fraction of chunks in `Acknowledged` state, in `[0, 100]`.
    pub fn progress(&self) -> f32 {
        if self.chunk_states.is_empty() {
            return 0.0;
        }
        let acked = self
            .chunk_states
            .iter()
            .filter(|c| c.kind == crate::chunk::ChunkStateKind::Acknowledged)
            .count();
        100.0 * acked as f32 / self.chunk_states.len() as f32
    }

    pub fn abandoned_count(&self) -> u32 {
        self.chunk_states
            .iter()
            .filter(|c| c.kind == crate::chunk::ChunkStateKind::Abandoned)
            .count() as u32
    }

    pub fn snapshot(&self, now: Instant) -> TransferSnapshot {
        let throughput_bps = self.throughput.throughput_bps(now);
        let remaining_bytes = self.total_bytes.saturating_sub(self.bytes_transmitted);
        let estimated_seconds_remaining = throughput_bps
            .filter(|bps| *bps > 0.0)
            .map(|bps| remaining_bytes as f64 / bps);

        TransferSnapshot {
            transfer_id: self.transfer_id.clone(),
            object_id: self.object_id.clone(),
            direction: self.direction,
            priority: self.priority,
            status: self.status.clone(),
            bytes_transmitted: self.bytes_transmitted,
            total_bytes: self.total_bytes,
            progress: self.progress(),
            throughput_bps,
            estimated_seconds_remaining,
            abandoned_chunks: self.abandoned_count(),
            queued_at: self.queued_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}
