//! Crate-wide error type and the error-kind classification used by the
//! RetryEngine and control plane to decide how to react to a failure without
//! matching every concrete variant (see spec §7).

use thiserror::Error;

use crate::beacon::BeaconError;
use crate::chunk::ChunkStoreError;
use crate::priority::SchedulerError;
use crate::reassembler::ReassemblerError;
use crate::retry::RetryError;
use crate::session::SessionError;
use crate::subcarrier::SubcarrierError;
use crate::swarm::SwarmError;
use crate::transport::TransportError;

/// The five error kinds named in spec §7. `classify()` maps any module error
/// onto one of these so callers can dispatch without an exhaustive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeout, temporary congestion, recoverable checksum failure — retried per policy.
    Transient,
    /// Transport reselected, then the peer is abandoned for this transfer.
    PeerUnreachable,
    /// Retried; repeated from one peer demotes that peer.
    ChecksumMismatch,
    /// Backpressure, then fail the transfer with a reason.
    StorageFull,
    /// Oversize object, unsupported modulation — immediate fail at admission.
    PolicyViolation,
    /// Invariant broken, corrupted manifest — abort, do not retry, surface to observer.
    Fatal,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("chunk store error: {0}")]
    ChunkStore(#[from] ChunkStoreError),

    #[error("subcarrier allocator error: {0}")]
    Subcarrier(#[from] SubcarrierError),

    #[error("retry engine error: {0}")]
    Retry(#[from] RetryError),

    #[error("swarm protocol error: {0}")]
    Swarm(#[from] SwarmError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("reassembler error: {0}")]
    Reassembler(#[from] ReassemblerError),

    #[error("beacon monitor error: {0}")]
    Beacon(#[from] BeaconError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("session store error: {0}")]
    Session(#[from] SessionError),

    #[error("transfer not found: {0}")]
    TransferNotFound(String),

    #[error("admission rejected: {0}")]
    AdmissionRejected(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn classify(&self) -> ErrorKind {
        match self {
            EngineError::ChunkStore(ChunkStoreError::ChecksumMismatch { .. }) => {
                ErrorKind::ChecksumMismatch
            }
            EngineError::ChunkStore(ChunkStoreError::StorageExhausted) => ErrorKind::StorageFull,
            EngineError::ChunkStore(ChunkStoreError::Fatal(_)) => ErrorKind::Fatal,
            EngineError::ChunkStore(_) => ErrorKind::Transient,
            EngineError::Subcarrier(_) => ErrorKind::Transient,
            EngineError::Retry(RetryError::Abandoned { .. }) => ErrorKind::Fatal,
            EngineError::Retry(_) => ErrorKind::Transient,
            EngineError::Swarm(_) => ErrorKind::Transient,
            EngineError::Transport(TransportError::PeerUnreachable(_)) => {
                ErrorKind::PeerUnreachable
            }
            EngineError::Transport(_) => ErrorKind::Transient,
            EngineError::Reassembler(ReassemblerError::ChecksumMismatch { .. }) => {
                ErrorKind::ChecksumMismatch
            }
            EngineError::Reassembler(_) => ErrorKind::Transient,
            EngineError::Beacon(_) => ErrorKind::Transient,
            EngineError::Scheduler(_) => ErrorKind::Transient,
            EngineError::Session(_) => ErrorKind::Transient,
            EngineError::TransferNotFound(_) => ErrorKind::PolicyViolation,
            EngineError::AdmissionRejected(_) => ErrorKind::PolicyViolation,
            EngineError::Io(_) => ErrorKind::Transient,
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
