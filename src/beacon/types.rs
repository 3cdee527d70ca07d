use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed route to a station, heard over the air (spec.md §3). Used
/// only to rank transports; never part of transfer persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconPath {
    pub origin: String,
    pub target: String,
    pub hop_count: u8,
    pub signal_strength: f32,
    pub last_heard: DateTime<Utc>,
    pub band: u16,
    pub frequency_hz: u32,
}

/// Coarse day/night split used to bucket reliability by propagation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayPart {
    Day,
    Night,
}

impl DayPart {
    pub fn from_hour(hour_utc: u32) -> Self {
        if (6..18).contains(&hour_utc) {
            DayPart::Day
        } else {
            DayPart::Night
        }
    }
}

/// Derived metrics for one `(origin, target)` pair, recomputed on demand
/// from the raw observation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathReport {
    pub target: String,
    pub average_signal_strength: f32,
    pub reliability: f32,
    pub observations: usize,
    pub day_reliability: f32,
    pub night_reliability: f32,
    pub last_heard: DateTime<Utc>,
}
