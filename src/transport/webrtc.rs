//! WebRTC peer channel transport. Signaling/room presence is treated as an
//! opaque oracle (spec.md §9 Open Questions): callers hand this an
//! already-negotiated `RTCDataChannel` per peer; this module only drives
//! send/recv/reachability over it.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::data_channel::RTCDataChannel;

use super::error::{Result, TransportError};
use super::traits::{Frame, Outcome, PeerChannel, Reachability};

struct PeerHandle {
    channel: Arc<RTCDataChannel>,
    reachability: Reachability,
}

pub struct WebRtcPeerChannel {
    peers: DashMap<String, PeerHandle>,
    inbox: mpsc::Sender<Frame>,
    inbox_rx: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
}

impl WebRtcPeerChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(256);
        Self {
            peers: DashMap::new(),
            inbox: tx,
            inbox_rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Registers a negotiated data channel for `peer`, wiring its `on_message`
    /// callback to feed this transport's shared inbox.
    pub fn attach_peer(&self, peer: &str, channel: Arc<RTCDataChannel>) {
        let inbox = self.inbox.clone();
        channel.on_message(Box::new(move |msg| {
            let inbox = inbox.clone();
            let bytes = Bytes::from(msg.data.to_vec());
            Box::pin(async move {
                let _ = inbox.send(Frame { bytes }).await;
            })
        }));
        self.peers.insert(
            peer.to_string(),
            PeerHandle { channel, reachability: Reachability::DirectWebRtc },
        );
    }

    pub fn detach_peer(&self, peer: &str) {
        self.peers.remove(peer);
    }
}

impl Default for WebRtcPeerChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerChannel for WebRtcPeerChannel {
    async fn send(&self, peer: &str, bytes: Bytes, deadline: Duration) -> Result<Outcome> {
        let handle = self
            .peers
            .get(peer)
            .ok_or_else(|| TransportError::PeerUnreachable(peer.to_string()))?;
        let channel = handle.channel.clone();
        drop(handle);

        match tokio::time::timeout(deadline, channel.send(&bytes)).await {
            Ok(Ok(_)) => Ok(Outcome::Delivered),
            Ok(Err(e)) => {
                tracing::warn!(peer, error = %e, "webrtc send failed");
                Ok(Outcome::Failed)
            }
            Err(_) => Ok(Outcome::TimedOut),
        }
    }

    async fn recv(&self) -> Result<Frame> {
        let mut rx = self.inbox_rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| TransportError::ReceiveFailed("webrtc inbox closed".into()))
    }

    fn reachability(&self, peer: &str) -> Reachability {
        self.peers
            .get(peer)
            .map(|h| h.reachability)
            .unwrap_or(Reachability::Offline)
    }
}
