use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("frame too short: need at least {need} bytes, have {have}")]
    FrameTooShort { need: usize, have: usize },

    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown message kind: {0}")]
    UnknownKind(u8),

    #[error("crc32 mismatch: frame corrupt")]
    CrcMismatch,

    #[error("body_len {declared} does not match actual body size {actual}")]
    BodyLenMismatch { declared: u32, actual: usize },

    #[error("malformed body for {kind}: {reason}")]
    MalformedBody { kind: &'static str, reason: &'static str },

    #[error("object_id must be 32 bytes, got {0}")]
    BadObjectId(usize),
}

pub type Result<T> = std::result::Result<T, SwarmError>;
