use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("no beacon observations for {0}")]
    NoObservations(String),
}

pub type Result<T> = std::result::Result<T, BeaconError>;
