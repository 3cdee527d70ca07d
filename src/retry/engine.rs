use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{info, warn};

use super::types::{FecConfig, RetryDecision, RetryPolicy};

struct TransferRetryState {
    total_chunks: u32,
    abandoned: HashSet<u32>,
    fec_used: HashSet<u32>,
}

/// Consumes allocation outcomes and turns them into requeue/FEC/abandon
/// decisions (spec.md §4.5). Holds no chunk bytes; callers own the chunk
/// state transition, this only decides *what* should happen next.
pub struct RetryEngine {
    policy: RetryPolicy,
    fec: FecConfig,
    transfers: Mutex<HashMap<String, TransferRetryState>>,
}

impl RetryEngine {
    pub fn new(policy: RetryPolicy, fec: FecConfig) -> Self {
        Self {
            policy,
            fec,
            transfers: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn register_transfer(&self, transfer_id: &str, total_chunks: u32) {
        self.transfers.lock().insert(
            transfer_id.to_string(),
            TransferRetryState {
                total_chunks,
                abandoned: HashSet::new(),
                fec_used: HashSet::new(),
            },
        );
    }

    pub fn forget_transfer(&self, transfer_id: &str) {
        self.transfers.lock().remove(transfer_id);
    }

    /// `base · 2^(attempts−1) + U(0, jitter)`, capped. `attempts` is the
    /// count *after* the failing attempt (i.e. the first failure has
    /// `attempts == 1`).
    fn backoff_for(&self, attempts: u32) -> Duration {
        let exp = if self.policy.exponential {
            1u32.checked_shl(attempts.saturating_sub(1)).unwrap_or(u32::MAX)
        } else {
            1
        };
        let scaled = self.policy.base_backoff.saturating_mul(exp.max(1));
        let jitter_ms = self.policy.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        (scaled + jitter).min(self.policy.backoff_cap)
    }

    /// Decide what happens to `(transfer_id, chunk_index)` after a failed
    /// attempt. `attempts` must already reflect the increment for this
    /// failure.
    pub fn on_failure(&self, transfer_id: &str, chunk_index: u32, attempts: u32) -> RetryDecision {
        if attempts < self.policy.max_attempts {
            let after = self.backoff_for(attempts);
            return RetryDecision::Requeue { after };
        }

        let mut transfers = self.transfers.lock();
        let state = transfers
            .entry(transfer_id.to_string())
            .or_insert_with(|| TransferRetryState {
                total_chunks: 1,
                abandoned: HashSet::new(),
                fec_used: HashSet::new(),
            });

        if self.fec.enabled && self.fec.redundancy > 0.0 && state.fec_used.insert(chunk_index) {
            info!(transfer_id, chunk_index, "escalating to FEC repair attempt");
            return RetryDecision::EscalateFec;
        }

        state.abandoned.insert(chunk_index);
        let fraction = state.abandoned.len() as f32 / state.total_chunks.max(1) as f32;
        warn!(transfer_id, chunk_index, fraction, "chunk abandoned");

        if fraction > self.policy.abandon_threshold {
            RetryDecision::AbandonTransfer
        } else {
            RetryDecision::Abandon
        }
    }

    pub fn on_success(&self, transfer_id: &str, chunk_index: u32) -> RetryDecision {
        if let Some(state) = self.transfers.lock().get_mut(transfer_id) {
            state.abandoned.remove(&chunk_index);
            state.fec_used.remove(&chunk_index);
        }
        RetryDecision::Acknowledged
    }

    pub fn abandoned_fraction(&self, transfer_id: &str) -> f32 {
        self.transfers
            .lock()
            .get(transfer_id)
            .map(|s| s.abandoned.len() as f32 / s.total_chunks.max(1) as f32)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RetryEngine {
        RetryEngine::new(
            RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_millis(100),
                exponential: true,
                jitter: Duration::from_millis(0),
                backoff_cap: Duration::from_secs(60),
                per_attempt_timeout: Duration::from_secs(30),
                abandon_threshold: 0.5,
            },
            FecConfig { enabled: true, redundancy: 0.25 },
        )
    }

    #[test]
    fn requeues_until_max_attempts() {
        let e = engine();
        e.register_transfer("t", 10);
        assert!(matches!(e.on_failure("t", 0, 1), RetryDecision::Requeue { .. }));
        assert!(matches!(e.on_failure("t", 0, 2), RetryDecision::Requeue { .. }));
    }

    #[test]
    fn escalates_to_fec_once_then_abandons() {
        let e = engine();
        e.register_transfer("t", 10);
        let first = e.on_failure("t", 0, 3);
        assert_eq!(first, RetryDecision::EscalateFec);
        let second = e.on_failure("t", 0, 3);
        assert_eq!(second, RetryDecision::Abandon);
    }

    #[test]
    fn abandon_threshold_fails_whole_transfer() {
        let e = engine();
        e.register_transfer("t", 4);
        for idx in 0..3 {
            e.on_failure("t", idx, 3);
            let decision = e.on_failure("t", idx, 3);
            if idx < 2 {
                assert_eq!(decision, RetryDecision::Abandon);
            } else {
                assert_eq!(decision, RetryDecision::AbandonTransfer);
            }
        }
    }

    #[test]
    fn backoff_is_capped() {
        let e = RetryEngine::new(
            RetryPolicy {
                max_attempts: 20,
                base_backoff: Duration::from_secs(1),
                exponential: true,
                jitter: Duration::from_millis(0),
                backoff_cap: Duration::from_secs(5),
                per_attempt_timeout: Duration::from_secs(30),
                abandon_threshold: 0.1,
            },
            FecConfig { enabled: false, redundancy: 0.0 },
        );
        let decision = e.on_failure("t", 0, 10);
        match decision {
            RetryDecision::Requeue { after } => assert_eq!(after, Duration::from_secs(5)),
            other => panic!("expected Requeue, got {other:?}"),
        }
    }
}
