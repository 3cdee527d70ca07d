use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-transfer retry knobs (spec.md §3 `RetryPolicy`, §6 control-plane keys).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub exponential: bool,
    pub jitter: Duration,
    pub backoff_cap: Duration,
    pub per_attempt_timeout: Duration,
    pub abandon_threshold: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
            exponential: true,
            jitter: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(60),
            per_attempt_timeout: Duration::from_secs(30),
            abandon_threshold: 0.10,
        }
    }
}

/// Forward-error-correction knobs (spec.md §6 `fec.*`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FecConfig {
    pub enabled: bool,
    /// Fraction of a logical block's shards that are parity, in `[0, 1]`.
    pub redundancy: f32,
}

impl Default for FecConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redundancy: 0.25,
        }
    }
}

/// What the caller must do after `RetryEngine::on_outcome` runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Chunk acknowledged; release its lane.
    Acknowledged,
    /// Requeue after `after` with attempts incremented; state goes back to
    /// runnable (`Failed`, attempts<max).
    Requeue { after: Duration },
    /// Attempts exhausted on the raw chunk but FEC has one repair shot left;
    /// attempts are reset once and a redundancy packet is requested.
    EscalateFec,
    /// All attempts (including any FEC escalation) exhausted.
    Abandon,
    /// This transfer has now crossed `abandon_threshold`; caller should fail
    /// the whole transfer in addition to abandoning the chunk.
    AbandonTransfer,
}
