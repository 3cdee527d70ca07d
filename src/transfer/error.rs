use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("invalid transition: cannot handle {event} in state {state}")]
    InvalidTransition { state: String, event: String },

    #[error("transfer {0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, TransferError>;
