use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no transport available for peer {0}")]
    NoPathAvailable(String),

    #[error("rf lane {0} is not reachable")]
    LaneUnreachable(u32),

    #[error("peer {0} is unreachable")]
    PeerUnreachable(String),

    #[error("send deadline exceeded")]
    DeadlineExceeded,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("certificate error: {0}")]
    CertificateError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
