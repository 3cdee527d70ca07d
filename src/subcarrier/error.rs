use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubcarrierError {
    #[error("subcarrier {0} is a pilot and cannot carry data")]
    PilotLane(u32),

    #[error("subcarrier {0} already has a live allocation")]
    LaneBusy(u32),

    #[error("unknown subcarrier id: {0}")]
    UnknownLane(u32),
}

pub type Result<T> = std::result::Result<T, SubcarrierError>;
