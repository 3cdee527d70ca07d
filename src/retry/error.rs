use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("chunk {object_id}/{index} abandoned")]
    Abandoned { object_id: String, index: u32 },

    #[error("FEC requested but no redundancy available for {object_id}")]
    NoRedundancyAvailable { object_id: String },

    #[error("reed-solomon error: {0}")]
    Erasure(#[from] reed_solomon_erasure::Error),
}

pub type Result<T> = std::result::Result<T, RetryError>;
