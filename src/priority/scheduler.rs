use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::error::Result;
use super::types::{best_candidate, Allocation, AllocationStatus, LaneLedger, SchedulerCandidate, SchedulerStats};

/// A free data lane offered to the scheduler for this tick, with its current
/// quality snapshot from the `SubcarrierAllocator`.
#[derive(Debug, Clone, Copy)]
pub struct FreeLane {
    pub subcarrier_id: u32,
    pub quality: f32,
}

/// The hard kernel: on each tick, binds a set of `(chunk, subcarrier)` pairs
/// honouring priority dominance, rarest-first, quality matching, the
/// fairness cap, and pilot protection (spec.md §4.3). Pilot lanes are never
/// passed in as `FreeLane`s by the caller — the allocator excludes them.
pub struct ChunkScheduler {
    max_lanes_per_transfer: usize,
    ledger: Mutex<LaneLedger>,
    stats: Mutex<SchedulerStats>,
}

impl ChunkScheduler {
    pub fn new(max_lanes_per_transfer: usize) -> Self {
        Self {
            max_lanes_per_transfer,
            ledger: Mutex::new(LaneLedger::default()),
            stats: Mutex::new(SchedulerStats::default()),
        }
    }

    pub fn lanes_held(&self, transfer_id: &str) -> u32 {
        self.ledger.lock().held(transfer_id)
    }

    pub fn release(&self, transfer_id: &str) {
        self.ledger.lock().decrement(transfer_id);
    }

    /// Run one scheduling tick. `free_lanes` must already exclude pilots and
    /// any lane with a live allocation; `candidates` must already exclude
    /// chunks with a live allocation. Lanes are walked in descending quality
    /// order; for each, the best-scoring eligible candidate is popped.
    pub fn tick(
        &self,
        mut free_lanes: Vec<FreeLane>,
        mut candidates: Vec<SchedulerCandidate>,
        estimate_duration: impl Fn(&SchedulerCandidate, f32) -> std::time::Duration,
    ) -> Result<Vec<Allocation>> {
        free_lanes.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(std::cmp::Ordering::Equal));

        let mut ledger = self.ledger.lock();
        let mut stats = self.stats.lock();
        stats.ticks += 1;
        stats.candidates_seen += candidates.len() as u64;

        let mut allocations = Vec::new();

        for lane in &free_lanes {
            let eligible: Vec<SchedulerCandidate> = candidates
                .iter()
                .filter(|c| {
                    let at_cap = ledger.held(&c.transfer_id) as usize >= self.max_lanes_per_transfer;
                    let other_pending = candidates
                        .iter()
                        .any(|o| o.transfer_id != c.transfer_id && o.priority <= c.priority);
                    !(at_cap && other_pending)
                })
                .cloned()
                .collect();

            let Some(chosen) = best_candidate(&eligible).cloned() else {
                continue;
            };

            candidates.retain(|c| !(c.transfer_id == chosen.transfer_id && c.chunk_index == chosen.chunk_index));
            ledger.increment(&chosen.transfer_id);

            let duration = estimate_duration(&chosen, lane.quality);
            debug!(transfer_id = %chosen.transfer_id, chunk_index = chosen.chunk_index, lane = lane.subcarrier_id, "chunk assigned");

            allocations.push(Allocation {
                transfer_id: chosen.transfer_id,
                chunk_index: chosen.chunk_index,
                subcarrier_id: lane.subcarrier_id,
                started_at: Utc::now(),
                estimated_duration: duration,
                status: AllocationStatus::Pending,
            });
        }

        stats.allocations_made += allocations.len() as u64;
        stats.idle_lanes_last_tick = (free_lanes.len() - allocations.len()) as u32;
        if !allocations.is_empty() {
            info!(count = allocations.len(), "scheduler tick dispatched allocations");
        }

        Ok(allocations)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Priority;

    fn candidate(transfer_id: &str, index: u32, priority: Priority, rarity: u32) -> SchedulerCandidate {
        SchedulerCandidate {
            transfer_id: transfer_id.to_string(),
            chunk_index: index,
            priority,
            allocated_bandwidth: 1,
            rarity,
            already_assigned_lanes: 0,
        }
    }

    #[test]
    fn priority_dominates_over_rarity() {
        let scheduler = ChunkScheduler::new(16);
        let lanes = vec![FreeLane { subcarrier_id: 0, quality: 1.0 }];
        let candidates = vec![
            candidate("low", 0, Priority::Background, 0),
            candidate("high", 0, Priority::Emergency, 99),
        ];

        let allocations = scheduler
            .tick(lanes, candidates, |_, _| std::time::Duration::from_millis(50))
            .unwrap();

        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].transfer_id, "high");
    }

    #[test]
    fn rarest_first_within_same_priority() {
        let scheduler = ChunkScheduler::new(16);
        let lanes = vec![FreeLane { subcarrier_id: 0, quality: 1.0 }];
        let candidates = vec![
            candidate("t", 0, Priority::Normal, 5),
            candidate("t", 1, Priority::Normal, 1),
        ];

        let allocations = scheduler
            .tick(lanes, candidates, |_, _| std::time::Duration::from_millis(50))
            .unwrap();

        assert_eq!(allocations[0].chunk_index, 1);
    }

    #[test]
    fn fairness_cap_yields_to_other_pending_transfers() {
        let scheduler = ChunkScheduler::new(1);
        for _ in 0..1 {
            scheduler.ledger.lock().increment("hog");
        }
        let lanes = vec![FreeLane { subcarrier_id: 0, quality: 1.0 }];
        let candidates = vec![
            candidate("hog", 0, Priority::Normal, 0),
            candidate("other", 0, Priority::Normal, 0),
        ];

        let allocations = scheduler
            .tick(lanes, candidates, |_, _| std::time::Duration::from_millis(50))
            .unwrap();

        assert_eq!(allocations[0].transfer_id, "other");
    }

    #[test]
    fn idle_lane_when_no_candidates() {
        let scheduler = ChunkScheduler::new(16);
        let lanes = vec![FreeLane { subcarrier_id: 0, quality: 1.0 }];
        let allocations = scheduler
            .tick(lanes, vec![], |_, _| std::time::Duration::from_millis(50))
            .unwrap();
        assert!(allocations.is_empty());
    }
}
