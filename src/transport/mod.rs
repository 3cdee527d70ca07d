//! TransportDispatcher: RF/WebRTC/Hybrid egress selection (spec.md §4.7, §6).

pub mod error;
pub mod hybrid;
pub mod policy;
pub mod rate_limiter;
pub mod rf;
pub mod traits;
pub mod webrtc;

pub use error::{Result as TransportResult, TransportError};
pub use hybrid::TransportDispatcher;
pub use policy::{chunk_size_for, decide_egress, DispatchContext, Egress, TransportMode};
pub use rate_limiter::TokenBucketPool;
pub use rf::QuicRfLane;
pub use traits::{Frame, LaneQuality, Outcome, PeerChannel, Reachability, RfLane};
pub use webrtc::WebRtcPeerChannel;
