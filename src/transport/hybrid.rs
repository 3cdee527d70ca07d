use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::error::{Result, TransportError};
use super::policy::{chunk_size_for, decide_egress, DispatchContext, Egress, TransportMode};
use super::rate_limiter::TokenBucketPool;
use super::traits::{Outcome, PeerChannel, Reachability, RfLane};
use crate::relay::{RelayNode, RouteInfo};

/// Maps an Allocation to a concrete egress: an RF lane, a WebRTC peer, or —
/// in Hybrid mode — whichever the policy picks per chunk (spec.md §4.7).
/// A relay node may be attached to cover the fourth reachability state: no
/// direct path, but a store-and-forward peer can carry the chunk onward.
pub struct TransportDispatcher {
    mode: TransportMode,
    rf: Arc<dyn RfLane>,
    peer_channel: Arc<dyn PeerChannel>,
    relay: Option<Arc<RelayNode>>,
    token_buckets: TokenBucketPool,
}

impl TransportDispatcher {
    pub fn new(mode: TransportMode, rf: Arc<dyn RfLane>, peer_channel: Arc<dyn PeerChannel>, bytes_per_second: u32) -> Self {
        Self {
            mode,
            rf,
            peer_channel,
            relay: None,
            token_buckets: TokenBucketPool::new(bytes_per_second),
        }
    }

    pub fn with_relay(mut self, relay: Arc<RelayNode>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn chunk_size_hint(&self, quality: f32) -> u32 {
        chunk_size_for(self.mode, quality)
    }

    /// Dispatch one chunk. `subcarrier_id` is used for RF egress,
    /// `peer` for WebRTC/relay egress; `is_broadcast` marks seeding sends
    /// with no single target peer (always routed over RF).
    pub async fn dispatch(
        &self,
        subcarrier_id: u32,
        peer: Option<&str>,
        bytes: Bytes,
        deadline: Duration,
        measured_goodput_bps: u64,
        target_goodput_bps: u64,
        is_broadcast: bool,
        transfer_id: &str,
    ) -> Result<Outcome> {
        let reachability = peer.map(|p| self.peer_channel.reachability(p)).unwrap_or(Reachability::Offline);

        let ctx = DispatchContext {
            mode: self.mode,
            chunk_len: bytes.len(),
            peer_reachability: reachability,
            measured_goodput_bps,
            target_goodput_bps,
            is_broadcast,
        };

        match decide_egress(&ctx) {
            Egress::Rf => self.rf.send(subcarrier_id, bytes, deadline).await,
            Egress::WebRtc => {
                let peer = peer.expect("WebRtc egress requires a peer");
                self.token_buckets.wait_for_bytes(peer, ctx.chunk_len).await;
                self.peer_channel.send(peer, bytes, deadline).await
            }
            Egress::Relay => {
                let peer = peer.expect("relay egress requires a target peer");
                let relay = self
                    .relay
                    .as_ref()
                    .ok_or_else(|| TransportError::NoPathAvailable(peer.to_string()))?;

                let route = RouteInfo::new(peer, relay.listen_addr(), transfer_id, 0);
                let chunk_id = format!("{transfer_id}:{subcarrier_id}");

                relay
                    .receive_chunk(chunk_id, route, bytes.to_vec())
                    .await
                    .map_err(|e| TransportError::SendFailed(e.to_string()))?;

                Ok(Outcome::Delivered)
            }
        }
    }
}
