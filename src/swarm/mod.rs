//! SwarmProtocol: binary wire frames for Announce/Discover/Have/Request/
//! Deliver/Ack/Cancel (spec.md §4.6, §6).

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{bitmap_from_runs, decode_frame, encode_frame, runs_from_bitmap, WIRE_VERSION};
pub use error::{Result as SwarmResult, SwarmError};
pub use types::{
    AckBody, AckStatus, AnnounceBody, CancelBody, DeliverBody, DiscoverBody, HaveBody, Message,
    MessageKind, RequestBody, Run,
};
