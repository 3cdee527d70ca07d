//! Exercises the engine across module boundaries: admission through
//! dispatch and cancellation (spec.md §8 property 7, scenario S6), and
//! content-addressed reassembly end to end (property 1).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use chunkwave::beacon::BeaconMonitor;
use chunkwave::chunk::{ChunkStore, ObjectMetadata, Priority};
use chunkwave::config::{EngineConfig, EngineConfigBuilder};
use chunkwave::engine::{Engine, PeerSelector};
use chunkwave::error::EngineError;
use chunkwave::reassembler::Reassembler;
use chunkwave::session::SessionStore;
use chunkwave::subcarrier::SubcarrierAllocator;
use chunkwave::transfer::{Direction, TransferStatus};
use chunkwave::transport::{Frame, LaneQuality, Outcome, PeerChannel, Reachability, RfLane, TransportResult};

/// Always-succeeds RF lane; `recv` never resolves since these tests never
/// exercise the ingress path.
struct StubRfLane;

#[async_trait]
impl RfLane for StubRfLane {
    async fn send(&self, _subcarrier_id: u32, _bytes: Bytes, _deadline: Duration) -> TransportResult<Outcome> {
        Ok(Outcome::Delivered)
    }

    async fn recv(&self) -> TransportResult<Frame> {
        std::future::pending().await
    }

    fn quality(&self, _subcarrier_id: u32) -> TransportResult<LaneQuality> {
        Ok(LaneQuality { quality: 1.0, estimated_bitrate: 64_000 })
    }
}

struct StubPeerChannel;

#[async_trait]
impl PeerChannel for StubPeerChannel {
    async fn send(&self, _peer: &str, _bytes: Bytes, _deadline: Duration) -> TransportResult<Outcome> {
        Ok(Outcome::Delivered)
    }

    async fn recv(&self) -> TransportResult<Frame> {
        std::future::pending().await
    }

    fn reachability(&self, _peer: &str) -> Reachability {
        Reachability::Offline
    }
}

async fn test_engine(chunk_size: u32) -> (Arc<Engine>, tempfile::TempDir) {
    test_engine_with_config(chunk_size, EngineConfig::default()).await
}

async fn test_engine_with_config(chunk_size: u32, config: EngineConfig) -> (Arc<Engine>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ChunkStore::new(dir.path(), chunk_size, 16 * 1024 * 1024));
    let subcarrier = Arc::new(SubcarrierAllocator::new(8, &[]));
    let session_store = Arc::new(SessionStore::new_in_memory().await.unwrap());

    let engine = Engine::new(
        config,
        store,
        subcarrier,
        Arc::new(StubRfLane),
        Arc::new(StubPeerChannel),
        Arc::new(BeaconMonitor::new()),
        session_store,
    );
    engine.spawn();
    (engine, dir)
}

#[tokio::test]
async fn admitted_transfer_reaches_scheduled_and_dispatches() {
    let (engine, _dir) = test_engine(256).await;

    let object_id = engine
        .publish(Bytes::from(vec![0xAB; 8 * 1024]), ObjectMetadata::default())
        .await
        .unwrap();

    let transfer_id = engine
        .offer(&object_id, PeerSelector::Broadcast, Priority::Normal, Direction::Upload)
        .await
        .unwrap();

    let snapshot = engine.progress(&transfer_id).unwrap();
    assert_eq!(snapshot.status, TransferStatus::Scheduled);
    assert_eq!(snapshot.object_id, object_id);

    let mut saw_initializing = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Some(snapshot) = engine.progress(&transfer_id) {
            if matches!(snapshot.status, TransferStatus::Initializing | TransferStatus::Transmitting) {
                saw_initializing = true;
                break;
            }
        }
    }
    assert!(saw_initializing, "scheduler tick never dispatched a chunk for the admitted transfer");
}

#[tokio::test]
async fn cancel_is_immediate_and_terminal() {
    let (engine, _dir) = test_engine(256).await;

    let object_id = engine
        .publish(Bytes::from(vec![0x11; 4 * 1024]), ObjectMetadata::default())
        .await
        .unwrap();
    let transfer_id = engine
        .offer(&object_id, PeerSelector::Peer("station-b".into()), Priority::Normal, Direction::Upload)
        .await
        .unwrap();

    engine.cancel(&transfer_id).unwrap();

    let snapshot = engine.progress(&transfer_id).unwrap();
    assert_eq!(snapshot.status, TransferStatus::Cancelled);

    // Cancelling twice is rejected, not silently accepted, since Cancelled
    // is terminal and TransferHandle::transition only allows Cancel from a
    // non-terminal state.
    assert!(engine.cancel(&transfer_id).is_err());
}

#[tokio::test]
async fn offer_for_unknown_object_is_rejected() {
    let (engine, _dir) = test_engine(256).await;
    let result = engine.offer("not-a-real-object", PeerSelector::Broadcast, Priority::Normal, Direction::Upload).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn reassembly_is_sound_and_idempotent_across_all_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ChunkStore::new(dir.path(), 512, 1024 * 1024));

    let original = Bytes::from((0..5000u32).map(|b| (b % 251) as u8).collect::<Vec<u8>>());
    let manifest = store.put_object(original.clone(), ObjectMetadata::default()).await.unwrap();

    // A second, empty store stands in for the receiving station; it shares
    // the same manifest so put_chunk can validate checksums against it.
    let receiver_dir = tempfile::tempdir().unwrap();
    let receiver_store = Arc::new(ChunkStore::new(receiver_dir.path(), 512, 1024 * 1024));
    receiver_store.put_object(original.clone(), ObjectMetadata::default()).await.unwrap();

    let reassembler = Reassembler::new(receiver_store.clone());

    // Deliver chunks out of order, with a duplicate retransmission thrown in.
    let mut indices: Vec<u32> = (0..manifest.total_chunks).collect();
    indices.reverse();
    for &index in &indices {
        let chunk = store.get_chunk(&manifest.object_id, index).await.unwrap();
        let (outcome, _ack) = reassembler.accept(&manifest.object_id, "peer-a", index, chunk.data).await.unwrap();
        assert_ne!(outcome, chunkwave::reassembler::DeliveryOutcome::ChecksumFailed);
    }
    let redelivered = store.get_chunk(&manifest.object_id, indices[0]).await.unwrap();
    let (outcome, _) = reassembler.accept(&manifest.object_id, "peer-a", indices[0], redelivered.data).await.unwrap();
    assert_eq!(outcome, chunkwave::reassembler::DeliveryOutcome::Duplicate);

    let sealed = receiver_store.read_sealed(&manifest.object_id).await.unwrap();
    assert_eq!(sealed, original);
    assert_eq!(blake3::hash(&original).to_hex().to_string(), manifest.object_id);
}

#[tokio::test]
async fn scheduler_dispatches_chunks_beyond_the_first() {
    let (engine, _dir) = test_engine(256).await;

    let object_id = engine
        .publish(Bytes::from(vec![0x22; 16 * 256]), ObjectMetadata::default())
        .await
        .unwrap();
    let transfer_id = engine
        .offer(&object_id, PeerSelector::Broadcast, Priority::Normal, Direction::Upload)
        .await
        .unwrap();

    let mut best_progress = 0.0f32;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Some(snapshot) = engine.progress(&transfer_id) {
            best_progress = best_progress.max(snapshot.progress);
            // One sixteenth (6.25%) is as far as a scheduler stuck on
            // chunk_index 0 could ever get; real per-chunk dispatch clears
            // it comfortably within this window.
            if best_progress > 100.0 / 16.0 {
                break;
            }
        }
    }
    assert!(
        best_progress > 100.0 / 16.0,
        "expected progress past the first chunk, saw {best_progress}"
    );
}

#[tokio::test]
async fn offer_is_rejected_once_concurrency_limit_is_reached() {
    let config = EngineConfigBuilder::new().max_concurrent_transfers(1).build();
    let (engine, _dir) = test_engine_with_config(256, config).await;

    let object_id = engine
        .publish(Bytes::from(vec![0x33; 4 * 1024]), ObjectMetadata::default())
        .await
        .unwrap();

    let first = engine
        .offer(&object_id, PeerSelector::Broadcast, Priority::Normal, Direction::Upload)
        .await
        .unwrap();

    let rejected = engine
        .offer(&object_id, PeerSelector::Broadcast, Priority::Normal, Direction::Upload)
        .await;
    assert!(matches!(rejected, Err(EngineError::AdmissionRejected(_))));

    engine.cancel(&first).unwrap();

    let second = engine
        .offer(&object_id, PeerSelector::Broadcast, Priority::Normal, Direction::Upload)
        .await;
    assert!(second.is_ok(), "cancelling the first transfer should free a concurrency slot");
}
