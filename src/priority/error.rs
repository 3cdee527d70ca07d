use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("subcarrier {0} already has a live allocation")]
    LaneBusy(u32),

    #[error("chunk ({0}, {1}) already has a live allocation")]
    ChunkBusy(String, u32),

    #[error("subcarrier {0} is a pilot lane and cannot carry data")]
    PilotLane(u32),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
