use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    TimedOut,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    DirectRf,
    DirectWebRtc,
    Relay,
    Offline,
}

#[derive(Debug, Clone, Copy)]
pub struct LaneQuality {
    pub quality: f32,
    pub estimated_bitrate: u32,
}

/// One OFDM data lane egress (spec.md §6). A real waveform generator is a
/// collaborator's concern; this trait is what the dispatcher drives.
#[async_trait]
pub trait RfLane: Send + Sync {
    async fn send(&self, subcarrier_id: u32, bytes: Bytes, deadline: Duration) -> Result<Outcome>;
    async fn recv(&self) -> Result<Frame>;
    fn quality(&self, subcarrier_id: u32) -> Result<LaneQuality>;
}

/// One peer-to-peer egress, e.g. a WebRTC data channel (spec.md §6). Peer
/// discovery/signaling is treated as an opaque oracle.
#[async_trait]
pub trait PeerChannel: Send + Sync {
    async fn send(&self, peer: &str, bytes: Bytes, deadline: Duration) -> Result<Outcome>;
    async fn recv(&self) -> Result<Frame>;
    fn reachability(&self, peer: &str) -> Reachability;
}
