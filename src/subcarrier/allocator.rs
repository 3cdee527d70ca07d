use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::priority::{Allocation, AllocationStatus};

use super::error::{Result, SubcarrierError};
use super::types::{Modulation, Subcarrier, SubcarrierKind};

const UPGRADE_THRESHOLD: f32 = 0.75;
const DOWNGRADE_THRESHOLD: f32 = 0.4;
/// Base symbol rate assumed for the narrowband OFDM channel, used only to
/// turn a modulation's bits-per-symbol into an illustrative bitrate estimate.
const SYMBOL_RATE_HZ: u32 = 100;

/// Maintains the N-carrier table (spec.md §4.4): a fixed set of pilot
/// positions that never bind, and data lanes whose modulation adapts to
/// rolling quality with hysteresis to avoid flapping.
pub struct SubcarrierAllocator {
    lanes: RwLock<Vec<Subcarrier>>,
}

impl SubcarrierAllocator {
    /// `total` carriers with pilots placed at `pilot_positions`.
    pub fn new(total: u32, pilot_positions: &[u32]) -> Self {
        let lanes = (0..total)
            .map(|id| {
                let kind = if pilot_positions.contains(&id) {
                    SubcarrierKind::Pilot
                } else {
                    SubcarrierKind::Data
                };
                Subcarrier::new(id, kind)
            })
            .collect();
        Self {
            lanes: RwLock::new(lanes),
        }
    }

    /// Convenience constructor matching the typical N=48 / 8-pilot layout
    /// named in spec.md §4.4: every 6th carrier is a pilot.
    pub fn typical() -> Self {
        let pilots: Vec<u32> = (0..48).step_by(6).collect();
        Self::new(48, &pilots)
    }

    pub fn free_data_lanes(&self) -> Vec<(u32, f32)> {
        self.lanes
            .read()
            .iter()
            .filter(|l| l.is_free())
            .map(|l| (l.id, l.quality))
            .collect()
    }

    pub fn quality(&self, id: u32) -> Result<f32> {
        self.lanes
            .read()
            .get(id as usize)
            .map(|l| l.quality)
            .ok_or(SubcarrierError::UnknownLane(id))
    }

    pub fn estimated_bitrate(&self, id: u32, modulation: Modulation) -> Result<u32> {
        if self.lanes.read().get(id as usize).is_none() {
            return Err(SubcarrierError::UnknownLane(id));
        }
        Ok(SYMBOL_RATE_HZ * modulation.bits_per_symbol())
    }

    /// Bind `chunk` (identified by `(transfer_id, chunk_index)`) to `id` for
    /// one transmission attempt. Fails on pilot lanes or lanes already bound.
    pub fn bind(
        &self,
        transfer_id: &str,
        chunk_index: u32,
        id: u32,
        modulation: Modulation,
        estimated_duration: Duration,
    ) -> Result<Allocation> {
        let mut lanes = self.lanes.write();
        let lane = lanes.get_mut(id as usize).ok_or(SubcarrierError::UnknownLane(id))?;

        if lane.kind == SubcarrierKind::Pilot {
            return Err(SubcarrierError::PilotLane(id));
        }
        if lane.allocation.is_some() {
            return Err(SubcarrierError::LaneBusy(id));
        }

        lane.allocation = Some((transfer_id.to_string(), chunk_index));
        lane.current_modulation = modulation;
        lane.estimated_bitrate = SYMBOL_RATE_HZ * modulation.bits_per_symbol();

        debug!(transfer_id, chunk_index, lane = id, "allocation bound");
        Ok(Allocation {
            transfer_id: transfer_id.to_string(),
            chunk_index,
            subcarrier_id: id,
            started_at: Utc::now(),
            estimated_duration,
            status: AllocationStatus::Pending,
        })
    }

    /// Release a lane's binding after the allocation completes or fails.
    pub fn release(&self, id: u32, _outcome: AllocationStatus) -> Result<()> {
        let mut lanes = self.lanes.write();
        let lane = lanes.get_mut(id as usize).ok_or(SubcarrierError::UnknownLane(id))?;
        lane.allocation = None;
        Ok(())
    }

    /// Feed one quality sample (e.g. from BeaconMonitor) and re-adapt
    /// modulation using two-consecutive-sample hysteresis.
    pub fn observe_quality(&self, id: u32, quality: f32) -> Result<()> {
        let clamped = quality.clamp(0.0, 1.0);
        let mut lanes = self.lanes.write();
        let lane = lanes.get_mut(id as usize).ok_or(SubcarrierError::UnknownLane(id))?;
        lane.quality = clamped;

        if clamped >= UPGRADE_THRESHOLD {
            lane.consecutive_above = lane.consecutive_above.saturating_add(1);
            lane.consecutive_below = 0;
        } else if clamped <= DOWNGRADE_THRESHOLD {
            lane.consecutive_below = lane.consecutive_below.saturating_add(1);
            lane.consecutive_above = 0;
        } else {
            lane.consecutive_above = 0;
            lane.consecutive_below = 0;
        }

        if lane.consecutive_above >= 2 {
            let next = lane.current_modulation.step_up();
            if next != lane.current_modulation {
                info!(lane = id, modulation = ?next, "modulation stepped up");
            }
            lane.current_modulation = next;
            lane.consecutive_above = 0;
        } else if lane.consecutive_below >= 2 {
            let next = lane.current_modulation.step_down();
            if next != lane.current_modulation {
                info!(lane = id, modulation = ?next, "modulation stepped down");
            }
            lane.current_modulation = next;
            lane.consecutive_below = 0;
        }

        lane.estimated_bitrate = SYMBOL_RATE_HZ * lane.current_modulation.bits_per_symbol();
        Ok(())
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.read().len()
    }

    pub fn pilot_count(&self) -> usize {
        self.lanes.read().iter().filter(|l| l.kind == SubcarrierKind::Pilot).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pilots_never_bind() {
        let allocator = SubcarrierAllocator::new(4, &[0, 2]);
        let result = allocator.bind("t", 0, 0, Modulation::Qpsk, Duration::from_millis(10));
        assert!(matches!(result, Err(SubcarrierError::PilotLane(0))));
    }

    #[test]
    fn double_bind_rejected() {
        let allocator = SubcarrierAllocator::new(4, &[]);
        allocator.bind("t", 0, 1, Modulation::Qpsk, Duration::from_millis(10)).unwrap();
        let result = allocator.bind("t2", 1, 1, Modulation::Qpsk, Duration::from_millis(10));
        assert!(matches!(result, Err(SubcarrierError::LaneBusy(1))));
    }

    #[test]
    fn hysteresis_requires_two_consecutive_samples() {
        let allocator = SubcarrierAllocator::new(2, &[]);
        allocator.observe_quality(1, 0.9).unwrap();
        assert_eq!(allocator.quality(1).unwrap(), 0.9);
        // one sample above threshold is not enough to step up yet
        let lanes = allocator.lanes.read();
        assert_eq!(lanes[1].current_modulation, Modulation::Bpsk);
        drop(lanes);

        allocator.observe_quality(1, 0.9).unwrap();
        let lanes = allocator.lanes.read();
        assert_eq!(lanes[1].current_modulation, Modulation::Qpsk);
    }

    #[test]
    fn free_data_lanes_excludes_pilots_and_bound() {
        let allocator = SubcarrierAllocator::new(4, &[0]);
        allocator.bind("t", 0, 1, Modulation::Qpsk, Duration::from_millis(10)).unwrap();
        let free = allocator.free_data_lanes();
        let ids: Vec<u32> = free.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
