//! Demonstration station binary: wires a ChunkStore, SubcarrierAllocator,
//! transport pair, and BeaconMonitor into one Engine, publishes a small
//! object, offers it to a peer, and prints progress until the transfer
//! reaches a terminal state or the demo times out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chunkwave::beacon::BeaconMonitor;
use chunkwave::chunk::{ChunkStore, ObjectMetadata, Priority};
use chunkwave::config::EngineConfig;
use chunkwave::engine::{Engine, PeerSelector};
use chunkwave::session::SessionStore;
use chunkwave::subcarrier::SubcarrierAllocator;
use chunkwave::transfer::Direction;
use chunkwave::transport::{QuicRfLane, WebRtcPeerChannel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    println!("chunkwave station starting");

    let bind_addr: SocketAddr = std::env::args()
        .nth(1)
        .map(|a| a.parse().expect("invalid bind address"))
        .unwrap_or_else(|| "0.0.0.0:7000".parse().unwrap());

    let store = Arc::new(ChunkStore::new("./chunkwave-data", 256 * 1024, 4 * 1024 * 1024 * 1024));
    let subcarrier = Arc::new(SubcarrierAllocator::typical());
    let rf = Arc::new(QuicRfLane::new(bind_addr).await?);
    let peer_channel = Arc::new(WebRtcPeerChannel::new());
    let beacon = Arc::new(BeaconMonitor::new());
    let session_store = Arc::new(SessionStore::new_in_memory().await?);

    let engine = Engine::new(
        EngineConfig::default(),
        store,
        subcarrier,
        rf,
        peer_channel,
        beacon,
        session_store,
    );
    let _handles = engine.spawn();

    let mut snapshots = engine.subscribe();

    let object_id = engine
        .publish(Bytes::from_static(b"hello over the air"), ObjectMetadata::default())
        .await?;
    println!("published object {object_id}");

    let transfer_id = engine
        .offer(&object_id, PeerSelector::Broadcast, Priority::Normal, Direction::Upload)
        .await?;
    println!("offered transfer {transfer_id}");

    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            snapshot = snapshots.recv() => {
                match snapshot {
                    Ok(snapshot) if snapshot.transfer_id == transfer_id => {
                        println!("{:?}: {:.1}% ({} bytes)", snapshot.status, snapshot.progress * 100.0, snapshot.bytes_transmitted);
                        if snapshot.status.is_terminal() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
            _ = &mut deadline => {
                println!("demo timed out waiting for transfer {transfer_id}");
                break;
            }
        }
    }

    Ok(())
}
