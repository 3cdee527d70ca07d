//! ChunkScheduler: priority-dominant, rarest-first, fairness-capped,
//! quality-matched chunk-to-subcarrier scheduling (spec.md §4.3).

pub mod error;
pub mod scheduler;
pub mod types;

pub use error::{Result as SchedulerResult, SchedulerError};
pub use scheduler::{ChunkScheduler, FreeLane};
pub use types::{Allocation, AllocationStatus, LaneLedger, SchedulerCandidate, SchedulerStats};
