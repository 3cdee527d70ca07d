use serde::{Deserialize, Serialize};

use super::traits::Reachability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    Rf,
    WebRtc,
    Hybrid,
}

/// Chunk-size policy per transport (spec.md §4.7): RF stays small because
/// narrowband SNR punishes long frames, WebRTC can afford larger ones,
/// Hybrid interpolates using the same step-table shape used for modulation
/// adaptation elsewhere in this crate (see DESIGN.md Open Question #3).
pub fn chunk_size_for(mode: TransportMode, quality: f32) -> u32 {
    let q = quality.clamp(0.0, 1.0);
    match mode {
        TransportMode::Rf => {
            if q < 0.3 {
                256
            } else if q < 0.6 {
                512
            } else {
                1024
            }
        }
        TransportMode::WebRtc => {
            if q < 0.3 {
                1024
            } else if q < 0.7 {
                4096
            } else {
                8192
            }
        }
        TransportMode::Hybrid => {
            if q < 0.3 {
                512
            } else if q < 0.6 {
                1024
            } else {
                2048
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Egress {
    Rf,
    WebRtc,
    Relay,
}

/// One dispatch decision input: how big is the chunk, is the peer reachable
/// over WebRTC, what's its measured goodput, and is this a
/// broadcast/seeding send with no single target peer.
pub struct DispatchContext {
    pub mode: TransportMode,
    pub chunk_len: usize,
    pub peer_reachability: Reachability,
    pub measured_goodput_bps: u64,
    pub target_goodput_bps: u64,
    pub is_broadcast: bool,
}

/// Decides RF vs WebRTC vs relay egress for one chunk (spec.md §4.7 policy).
pub fn decide_egress(ctx: &DispatchContext) -> Egress {
    match ctx.mode {
        TransportMode::Rf => Egress::Rf,
        TransportMode::WebRtc => Egress::WebRtc,
        TransportMode::Hybrid => {
            if ctx.is_broadcast {
                return Egress::Rf;
            }
            if ctx.peer_reachability == Reachability::Relay {
                return Egress::Relay;
            }
            let webrtc_ready = ctx.peer_reachability == Reachability::DirectWebRtc
                && ctx.measured_goodput_bps > ctx.target_goodput_bps;
            // large chunks favour WebRTC when it's healthy; small chunks and
            // broadcast/seeding stay on RF.
            if webrtc_ready && ctx.chunk_len >= 1024 {
                Egress::WebRtc
            } else {
                Egress::Rf
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_scales_with_quality_per_transport() {
        assert_eq!(chunk_size_for(TransportMode::Rf, 0.1), 256);
        assert_eq!(chunk_size_for(TransportMode::Rf, 0.9), 1024);
        assert_eq!(chunk_size_for(TransportMode::WebRtc, 0.9), 8192);
    }

    #[test]
    fn hybrid_prefers_webrtc_for_large_healthy_chunks() {
        let ctx = DispatchContext {
            mode: TransportMode::Hybrid,
            chunk_len: 2048,
            peer_reachability: Reachability::DirectWebRtc,
            measured_goodput_bps: 2_000_000,
            target_goodput_bps: 1_000_000,
            is_broadcast: false,
        };
        assert_eq!(decide_egress(&ctx), Egress::WebRtc);
    }

    #[test]
    fn hybrid_falls_back_to_rf_for_broadcast() {
        let ctx = DispatchContext {
            mode: TransportMode::Hybrid,
            chunk_len: 4096,
            peer_reachability: Reachability::DirectWebRtc,
            measured_goodput_bps: 2_000_000,
            target_goodput_bps: 1_000_000,
            is_broadcast: true,
        };
        assert_eq!(decide_egress(&ctx), Egress::Rf);
    }

    #[test]
    fn hybrid_falls_back_to_rf_when_webrtc_unhealthy() {
        let ctx = DispatchContext {
            mode: TransportMode::Hybrid,
            chunk_len: 2048,
            peer_reachability: Reachability::Offline,
            measured_goodput_bps: 500,
            target_goodput_bps: 1_000_000,
            is_broadcast: false,
        };
        assert_eq!(decide_egress(&ctx), Egress::Rf);
    }

    #[test]
    fn hybrid_routes_through_relay_when_only_relay_reachable() {
        let ctx = DispatchContext {
            mode: TransportMode::Hybrid,
            chunk_len: 2048,
            peer_reachability: Reachability::Relay,
            measured_goodput_bps: 500,
            target_goodput_bps: 1_000_000,
            is_broadcast: false,
        };
        assert_eq!(decide_egress(&ctx), Egress::Relay);
    }
}
