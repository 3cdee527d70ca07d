/// Result of feeding one delivered chunk through the reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Chunk stored; object is not yet complete.
    Stored,
    /// Chunk stored and it was the last one needed; the object sealed.
    Completed,
    /// Chunk failed its checksum; the sender is blamed.
    ChecksumFailed,
    /// Chunk was already present (duplicate delivery, e.g. from a slow peer
    /// racing a faster one); treated as a no-op success.
    Duplicate,
}

/// Consecutive-failure counter per (object, peer), used to demote peers that
/// keep sending corrupt chunks for the same object (spec.md §4.6).
pub const DEMOTION_THRESHOLD: u32 = 3;
