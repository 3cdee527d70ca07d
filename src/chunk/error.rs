use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch for {object_id} chunk {index}")]
    ChecksumMismatch { object_id: String, index: u32 },

    #[error("chunk index {index} out of range for object {object_id} ({total} chunks)")]
    IndexOutOfRange {
        object_id: String,
        index: u32,
        total: u32,
    },

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("chunk not present locally: {object_id} index {index}")]
    ChunkNotPresent { object_id: String, index: u32 },

    #[error("object not sealed: missing {missing} of {total} chunks")]
    NotSealed { missing: usize, total: u32 },

    #[error("sealed hash mismatch for object {0}")]
    SealHashMismatch(String),

    #[error("storage exhausted, eviction could not free enough space")]
    StorageExhausted,

    #[error("fatal chunk store error: {0}")]
    Fatal(String),

    #[error("manifest serialization error: {0}")]
    Manifest(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChunkStoreError>;
