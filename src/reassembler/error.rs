use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReassemblerError {
    #[error("checksum mismatch for {object_id} chunk {index} from peer {peer}")]
    ChecksumMismatch { object_id: String, index: u32, peer: String },

    #[error("chunk store error: {0}")]
    Store(#[from] crate::chunk::ChunkStoreError),

    #[error("object {0} not yet complete")]
    Incomplete(String),
}

pub type Result<T> = std::result::Result<T, ReassemblerError>;
