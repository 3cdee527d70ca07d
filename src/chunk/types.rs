use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Transfer priority, highest to lowest. Ordering is derived so that
/// `Priority::Emergency < Priority::Background` — schedulers sort ascending
/// to get highest-priority-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Emergency,
    High,
    Normal,
    Low,
    Background,
}

impl Priority {
    /// Scheduling weight; higher wins ties in the scoring tuple.
    pub fn weight(self) -> u8 {
        match self {
            Priority::Emergency => 4,
            Priority::High => 3,
            Priority::Normal => 2,
            Priority::Low => 1,
            Priority::Background => 0,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Optional, mostly-opaque attributes carried alongside an object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub mime: Option<String>,
    pub filename: Option<String>,
    pub compression: Option<String>,
}

/// On-disk and wire representation of an object's chunk layout, written to
/// `<object_id>/manifest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectManifest {
    pub object_id: String,
    pub size: u64,
    pub chunk_size: u32,
    pub total_chunks: u32,
    pub checksums: Vec<[u8; 32]>,
    pub metadata: ObjectMetadata,
}

impl ObjectManifest {
    pub fn chunk_len(&self, index: u32) -> u32 {
        if index + 1 == self.total_chunks {
            let full = self.chunk_size as u64 * (self.total_chunks - 1) as u64;
            (self.size - full) as u32
        } else {
            self.chunk_size
        }
    }

    pub fn chunk_offset(&self, index: u32) -> u64 {
        self.chunk_size as u64 * index as u64
    }
}

/// One slice of an object, with bytes present when held locally.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub object_id: String,
    pub index: u32,
    pub offset: u64,
    pub length: u32,
    pub checksum: [u8; 32],
    pub data: bytes::Bytes,
}

/// Per-transfer chunk state, one of the six FSM states named in the data
/// model. Kept separate from `Chunk` since a chunk's wire identity is
/// content-addressed but its transfer progress is per-transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStateKind {
    Pending,
    Assigned,
    InFlight,
    Acknowledged,
    Failed,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkState {
    pub kind: ChunkStateKind,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
    pub assigned_lane: Option<u32>,
    pub last_error_kind: Option<ErrorKindTag>,
}

/// Serializable mirror of `crate::error::ErrorKind` so per-chunk state can be
/// persisted without pulling `EngineError` into the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKindTag {
    Transient,
    PeerUnreachable,
    ChecksumMismatch,
    StorageFull,
    PolicyViolation,
    Fatal,
}

impl From<ErrorKind> for ErrorKindTag {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Transient => ErrorKindTag::Transient,
            ErrorKind::PeerUnreachable => ErrorKindTag::PeerUnreachable,
            ErrorKind::ChecksumMismatch => ErrorKindTag::ChecksumMismatch,
            ErrorKind::StorageFull => ErrorKindTag::StorageFull,
            ErrorKind::PolicyViolation => ErrorKindTag::PolicyViolation,
            ErrorKind::Fatal => ErrorKindTag::Fatal,
        }
    }
}

impl ChunkState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            kind: ChunkStateKind::Pending,
            attempts: 0,
            max_attempts,
            last_attempt_at: None,
            assigned_lane: None,
            last_error_kind: None,
        }
    }

    pub fn is_runnable(&self) -> bool {
        matches!(self.kind, ChunkStateKind::Pending)
            || (self.kind == ChunkStateKind::Failed && self.attempts < self.max_attempts)
    }
}

/// Local availability of an object's chunks.
#[derive(Debug, Clone)]
pub struct Availability {
    bits: Vec<bool>,
}

impl Availability {
    pub fn new(total_chunks: u32) -> Self {
        Self {
            bits: vec![false; total_chunks as usize],
        }
    }

    pub fn set(&mut self, index: u32) {
        if let Some(b) = self.bits.get_mut(index as usize) {
            *b = true;
        }
    }

    pub fn has(&self, index: u32) -> bool {
        self.bits.get(index as usize).copied().unwrap_or(false)
    }

    pub fn missing(&self) -> Vec<u32> {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, present)| !**present)
            .map(|(i, _)| i as u32)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn is_complete(&self) -> bool {
        self.bits.iter().all(|b| *b)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }
}
