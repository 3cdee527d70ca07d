use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::Priority;

/// A runnable `(transfer, chunk)` candidate considered at one scheduler tick.
/// `rarity` is the count of known seeders across the swarm for this chunk
/// (lower is rarer, preferred first); `already_assigned_lanes` is how many
/// lanes the owning transfer currently holds, used for the fairness cap.
#[derive(Debug, Clone)]
pub struct SchedulerCandidate {
    pub transfer_id: String,
    pub chunk_index: u32,
    pub priority: Priority,
    pub allocated_bandwidth: u64,
    pub rarity: u32,
    pub already_assigned_lanes: u32,
}

impl SchedulerCandidate {
    /// Sort key for `(priority_weight, rarity, -already_assigned_lanes, -chunk_index)`,
    /// highest-scoring first.
    fn score_tuple(&self) -> (u8, std::cmp::Reverse<u32>, std::cmp::Reverse<u32>, std::cmp::Reverse<u32>) {
        (
            self.priority.weight(),
            std::cmp::Reverse(self.rarity),
            std::cmp::Reverse(self.already_assigned_lanes),
            std::cmp::Reverse(self.chunk_index),
        )
    }
}

pub fn best_candidate<'a>(candidates: &'a [SchedulerCandidate]) -> Option<&'a SchedulerCandidate> {
    candidates.iter().max_by_key(|c| c.score_tuple())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStatus {
    Pending,
    Transmitting,
    Completed,
    Failed,
}

/// A live binding of one chunk to one subcarrier for one transmission
/// attempt. At most one live allocation per subcarrier and per chunk.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub transfer_id: String,
    pub chunk_index: u32,
    pub subcarrier_id: u32,
    pub started_at: DateTime<Utc>,
    pub estimated_duration: Duration,
    pub status: AllocationStatus,
}

/// Per-transfer lane counts, maintained by the scheduler across ticks for
/// the fairness cap and priority-dominance checks.
#[derive(Debug, Default, Clone)]
pub struct LaneLedger {
    pub lanes_per_transfer: HashMap<String, u32>,
}

impl LaneLedger {
    pub fn held(&self, transfer_id: &str) -> u32 {
        *self.lanes_per_transfer.get(transfer_id).unwrap_or(&0)
    }

    pub fn increment(&mut self, transfer_id: &str) {
        *self.lanes_per_transfer.entry(transfer_id.to_string()).or_insert(0) += 1;
    }

    pub fn decrement(&mut self, transfer_id: &str) {
        if let Some(v) = self.lanes_per_transfer.get_mut(transfer_id) {
            *v = v.saturating_sub(1);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub allocations_made: u64,
    pub candidates_seen: u64,
    pub idle_lanes_last_tick: u32,
}
