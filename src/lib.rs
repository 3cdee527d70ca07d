//! Parallel chunked content-transfer engine: moves content-addressed objects
//! between stations over a narrowband RF lane, a WebRTC peer channel, or a
//! store-and-forward relay, using fixed-size chunking, per-chunk retry/FEC
//! recovery, a BitTorrent-style swarm protocol, and subcarrier-aware
//! scheduling (see DESIGN.md for the module-by-module grounding).

pub mod beacon;
pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod priority;
pub mod reassembler;
pub mod relay;
pub mod retry;
pub mod session;
pub mod subcarrier;
pub mod swarm;
pub mod transfer;
pub mod transport;

pub use config::EngineConfig;
pub use engine::{Engine, PeerSelector};
pub use error::{EngineError, EngineResult, ErrorKind};
