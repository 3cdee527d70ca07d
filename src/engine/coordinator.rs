use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::beacon::BeaconMonitor;
use crate::chunk::{ObjectMetadata, Priority, SharedChunkStore};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::priority::{ChunkScheduler, FreeLane, SchedulerCandidate};
use crate::reassembler::{DeliveryOutcome, Reassembler};
use crate::retry::{RetryDecision, RetryEngine};
use crate::session::{SessionState, SessionStore};
use crate::subcarrier::SubcarrierAllocator;
use crate::swarm::{decode_frame, encode_frame, AckBody, AckStatus, Message, Run};
use crate::transfer::{Direction, Transfer, TransferEvent, TransferHandle, TransferSnapshot};
use crate::transport::{Frame, Outcome, PeerChannel, RfLane, TransportDispatcher};

/// How a caller picks which peers a transfer should run against (spec.md §6
/// `offer(object_id, peer_selector, priority)`).
#[derive(Debug, Clone)]
pub enum PeerSelector {
    /// Broadcast seeding: no single peer, always routed over RF.
    Broadcast,
    /// Target one specific peer.
    Peer(String),
    /// Target the first reachable peer in the set.
    AnyOf(Vec<String>),
}

/// Owns every collaborator module and the three long-lived tasks that drive
/// a transfer engine (spec.md §5): the scheduler tick loop, the dispatch
/// pool it feeds, and the network ingress drain that turns inbound frames
/// into Reassembler/RetryEngine/TransferHandle events.
pub struct Engine {
    config: EngineConfig,
    store: SharedChunkStore,
    subcarrier: Arc<SubcarrierAllocator>,
    scheduler: Arc<ChunkScheduler>,
    retry: Arc<RetryEngine>,
    dispatcher: Arc<TransportDispatcher>,
    rf: Arc<dyn RfLane>,
    peer_channel: Arc<dyn PeerChannel>,
    reassembler: Arc<Reassembler>,
    beacon: Arc<BeaconMonitor>,
    session_store: Arc<SessionStore>,
    transfers: Arc<DashMap<String, Arc<TransferHandle>>>,
    peer_targets: Arc<DashMap<String, Vec<String>>>,
    object_transfers: Arc<DashMap<String, String>>,
    chunk_rarity: Arc<DashMap<(String, u32), u32>>,
    snapshot_tx: mpsc::Sender<TransferSnapshot>,
    observers: broadcast::Sender<TransferSnapshot>,
    dispatch_permits: Arc<Semaphore>,
    next_transfer_id: AtomicU64,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        store: SharedChunkStore,
        subcarrier: Arc<SubcarrierAllocator>,
        rf: Arc<dyn RfLane>,
        peer_channel: Arc<dyn PeerChannel>,
        beacon: Arc<BeaconMonitor>,
        session_store: Arc<SessionStore>,
    ) -> Arc<Self> {
        let scheduler = Arc::new(ChunkScheduler::new(config.max_lanes_per_transfer));
        let retry = Arc::new(RetryEngine::new(config.retry_policy.clone(), config.fec_config.clone()));
        let dispatcher = Arc::new(
            TransportDispatcher::new(config.default_mode, rf.clone(), peer_channel.clone(), 64 * 1024)
        );
        let reassembler = Arc::new(Reassembler::new(store.clone()));

        let (snapshot_tx, snapshot_rx) = mpsc::channel(1024);
        let (observers, _) = broadcast::channel(1024);

        let engine = Arc::new(Self {
            config,
            store,
            subcarrier,
            scheduler,
            retry,
            dispatcher,
            rf,
            peer_channel,
            reassembler,
            beacon,
            session_store,
            transfers: Arc::new(DashMap::new()),
            peer_targets: Arc::new(DashMap::new()),
            object_transfers: Arc::new(DashMap::new()),
            chunk_rarity: Arc::new(DashMap::new()),
            snapshot_tx,
            observers,
            dispatch_permits: Arc::new(Semaphore::new(16)),
            next_transfer_id: AtomicU64::new(0),
        });

        let forward_engine = engine.clone();
        tokio::spawn(forward_engine.run_observer_forwarder(snapshot_rx));

        engine
    }

    /// Spawn the scheduler tick loop and the network ingress drain loop.
    /// Returns their join handles so a caller can await clean shutdown.
    pub fn spawn(self: &Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        let tick_engine = self.clone();
        let tick_handle = tokio::spawn(async move { tick_engine.run_scheduler_loop().await });

        let ingress_engine = self.clone();
        let ingress_handle = tokio::spawn(async move { ingress_engine.run_ingress_loop().await });

        (tick_handle, ingress_handle)
    }

    /// Subscribe to transfer status snapshots (spec.md §6 observer
    /// subscription; filtering by `object_id`/`transfer_id` is left to the
    /// subscriber, since the broadcast is the single shared stream).
    pub fn subscribe(&self) -> broadcast::Receiver<TransferSnapshot> {
        self.observers.subscribe()
    }

    /// Chunk and store `bytes`, returning its content-addressed `object_id`
    /// (spec.md §6 `publish(bytes, metadata) → object_id`).
    pub async fn publish(&self, bytes: Bytes, metadata: ObjectMetadata) -> EngineResult<String> {
        let manifest = self.store.put_object(bytes, metadata).await?;
        info!(object_id = %manifest.object_id, total_chunks = manifest.total_chunks, "object published");
        Ok(manifest.object_id)
    }

    /// Start moving a published object to/from `peer_selector` at
    /// `priority`, returning the new `transfer_id` (spec.md §6
    /// `offer(object_id, peer_selector, priority) → transfer_id`).
    pub async fn offer(
        &self,
        object_id: &str,
        peer_selector: PeerSelector,
        priority: Priority,
        direction: Direction,
    ) -> EngineResult<String> {
        let active = self
            .transfers
            .iter()
            .filter(|entry| !entry.value().snapshot().status.is_terminal())
            .count();
        if active >= self.config.max_concurrent_transfers {
            return Err(EngineError::AdmissionRejected(format!(
                "at concurrency limit ({} active transfers)",
                self.config.max_concurrent_transfers
            )));
        }

        let manifest = self.store.manifest(object_id).await?;

        let transfer_id = format!("t-{}", self.next_transfer_id.fetch_add(1, Ordering::Relaxed));
        let peer_set = match &peer_selector {
            PeerSelector::Broadcast => Vec::new(),
            PeerSelector::Peer(p) => vec![p.clone()],
            PeerSelector::AnyOf(peers) => peers.clone(),
        };

        let mut transfer = Transfer::new(
            transfer_id.clone(),
            object_id.to_string(),
            direction,
            priority,
            manifest.total_chunks,
            manifest.size,
            self.config.default_mode,
            self.config.retry_policy.clone(),
            self.config.fec_config.clone(),
        );
        transfer.peer_set = peer_set.clone();

        self.retry.register_transfer(&transfer_id, manifest.total_chunks);

        let handle = TransferHandle::new(transfer, self.snapshot_tx.clone());
        handle
            .transition(TransferEvent::Admit)
            .map_err(|_| EngineError::AdmissionRejected(transfer_id.clone()))?;

        let session = SessionState::new(transfer_id.clone(), object_id.to_string(), manifest);
        self.session_store.save(&session).await?;

        self.transfers.insert(transfer_id.clone(), handle);
        self.peer_targets.insert(transfer_id.clone(), peer_set);
        // AckBody carries only object_id+index on the wire (spec.md §6), so
        // inbound acks need this reverse lookup to reach the right transfer.
        // Last offer for a given object wins if more than one is in flight.
        self.object_transfers.insert(object_id.to_string(), transfer_id.clone());
        info!(transfer_id = %transfer_id, object_id, "transfer admitted");
        Ok(transfer_id)
    }

    pub fn progress(&self, transfer_id: &str) -> Option<TransferSnapshot> {
        self.transfers.get(transfer_id).map(|h| h.snapshot())
    }

    pub fn pause(&self, transfer_id: &str) -> EngineResult<()> {
        self.apply_event(transfer_id, TransferEvent::Pause)
    }

    pub fn resume(&self, transfer_id: &str) -> EngineResult<()> {
        self.apply_event(transfer_id, TransferEvent::Resume)
    }

    pub fn cancel(&self, transfer_id: &str) -> EngineResult<()> {
        self.apply_event(transfer_id, TransferEvent::Cancel)?;
        self.scheduler.release(transfer_id);
        self.retry.forget_transfer(transfer_id);
        self.peer_targets.remove(transfer_id);
        self.object_transfers.retain(|_, v| v.as_str() != transfer_id);
        Ok(())
    }

    fn apply_event(&self, transfer_id: &str, event: TransferEvent) -> EngineResult<()> {
        let handle = self
            .transfers
            .get(transfer_id)
            .ok_or_else(|| EngineError::TransferNotFound(transfer_id.to_string()))?;
        handle
            .transition(event)
            .map_err(|_| EngineError::TransferNotFound(transfer_id.to_string()))?;
        Ok(())
    }

    async fn run_observer_forwarder(self: Arc<Self>, mut rx: mpsc::Receiver<TransferSnapshot>) {
        while let Some(snapshot) = rx.recv().await {
            let _ = self.observers.send(snapshot);
        }
    }

    /// One scheduler tick: collect runnable chunks across active transfers,
    /// bind them to free subcarriers, and hand each allocation to the
    /// dispatch pool (spec.md §4.3, §5).
    async fn run_scheduler_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.scheduler_tick_interval);
        loop {
            ticker.tick().await;

            let free_lanes: Vec<FreeLane> = self
                .subcarrier
                .free_data_lanes()
                .into_iter()
                .map(|(subcarrier_id, quality)| FreeLane { subcarrier_id, quality })
                .collect();
            if free_lanes.is_empty() {
                continue;
            }

            let candidates = self.collect_candidates();
            if candidates.is_empty() {
                continue;
            }

            let allocations = match self.scheduler.tick(free_lanes, candidates, |_, quality| {
                let bitrate = 100.0 * quality.max(0.05);
                Duration::from_millis((1024.0 / bitrate * 1000.0) as u64).max(Duration::from_millis(10))
            }) {
                Ok(a) => a,
                Err(e) => {
                    warn!(error = %e, "scheduler tick failed");
                    continue;
                }
            };

            for allocation in &allocations {
                if let Some(handle) = self.transfers.get(&allocation.transfer_id).map(|h| h.clone()) {
                    handle.mark_chunk_in_flight(allocation.chunk_index, allocation.subcarrier_id);
                }
            }

            for allocation in allocations {
                let engine = self.clone();
                let permits = self.dispatch_permits.clone();
                tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else { return };
                    engine.dispatch_allocation(allocation).await;
                });
            }
        }
    }

    /// Rarity of one chunk across the swarm: the count of `Have`/`Announce`
    /// reports seen claiming it, lower preferred first (spec.md §4.3.2).
    /// Chunks nobody has reported yet default to the rarest bucket rather
    /// than a fabricated count.
    fn rarity_for(&self, object_id: &str, chunk_index: u32) -> u32 {
        self.chunk_rarity
            .get(&(object_id.to_string(), chunk_index))
            .map(|r| *r)
            .unwrap_or(0)
    }

    fn record_availability(&self, object_id: &str, runs: &[Run]) {
        for run in runs {
            for idx in run.start..(run.start + run.run_len) {
                *self.chunk_rarity.entry((object_id.to_string(), idx)).or_insert(0) += 1;
            }
        }
    }

    fn collect_candidates(&self) -> Vec<SchedulerCandidate> {
        let mut out = Vec::new();
        for entry in self.transfers.iter() {
            let handle = entry.value();
            let snapshot = handle.snapshot();
            if snapshot.status.is_terminal() {
                continue;
            }
            let held = self.scheduler.lanes_held(&snapshot.transfer_id);
            for chunk_index in handle.runnable_chunks() {
                let rarity = self.rarity_for(&snapshot.object_id, chunk_index);
                out.push(SchedulerCandidate {
                    transfer_id: snapshot.transfer_id.clone(),
                    chunk_index,
                    priority: snapshot.priority,
                    allocated_bandwidth: 0,
                    rarity,
                    already_assigned_lanes: held,
                });
            }
        }
        out
    }

    async fn dispatch_allocation(&self, allocation: crate::priority::Allocation) {
        let Some(handle) = self.transfers.get(&allocation.transfer_id).map(|h| h.clone()) else {
            self.scheduler.release(&allocation.transfer_id);
            self.subcarrier.release(allocation.subcarrier_id, crate::priority::AllocationStatus::Failed).ok();
            return;
        };

        let peers = self
            .peer_targets
            .get(&allocation.transfer_id)
            .map(|p| p.clone())
            .unwrap_or_default();
        let peer = peers.first().cloned();
        let is_broadcast = peer.is_none();

        let chunk = match self.store.get_chunk(&handle.object_id(), allocation.chunk_index).await {
            Ok(chunk) => chunk.data,
            Err(e) => {
                warn!(error = %e, transfer_id = %allocation.transfer_id, "could not read chunk for dispatch");
                self.scheduler.release(&allocation.transfer_id);
                self.subcarrier.release(allocation.subcarrier_id, crate::priority::AllocationStatus::Failed).ok();
                return;
            }
        };

        let outcome = self
            .dispatcher
            .dispatch(
                allocation.subcarrier_id,
                peer.as_deref(),
                chunk,
                allocation.estimated_duration,
                0,
                0,
                is_broadcast,
                &allocation.transfer_id,
            )
            .await;

        self.subcarrier.release(allocation.subcarrier_id, crate::priority::AllocationStatus::Completed).ok();
        // The fairness-cap ledger tracks lanes a transfer currently holds;
        // this allocation's hold ends here whether it succeeded or not.
        self.scheduler.release(&allocation.transfer_id);

        match outcome {
            Ok(Outcome::Delivered) => {
                handle.mark_chunk_acknowledged(allocation.chunk_index);
                let _ = handle.transition(TransferEvent::FirstChunkDispatched);
                let _ = self.retry.on_success(&allocation.transfer_id, allocation.chunk_index);
            }
            _ => {
                let attempts = handle.mark_chunk_failed(allocation.chunk_index);
                let decision = self.retry.on_failure(&allocation.transfer_id, allocation.chunk_index, attempts);
                debug!(transfer_id = %allocation.transfer_id, chunk_index = allocation.chunk_index, ?decision, "dispatch did not deliver");
                if matches!(decision, RetryDecision::Abandon | RetryDecision::AbandonTransfer) {
                    handle.mark_chunk_abandoned(allocation.chunk_index);
                }
                if matches!(decision, RetryDecision::AbandonTransfer) {
                    let _ = handle.transition(TransferEvent::RetryExhausted { reason: "abandon threshold exceeded".into() });
                }
            }
        }
    }

    /// Drains inbound frames from both transport adapters and turns
    /// Deliver/Ack/Cancel messages into Reassembler/RetryEngine/TransferHandle
    /// events (spec.md §6 wire format).
    async fn run_ingress_loop(self: Arc<Self>) {
        loop {
            let rf_recv = self.rf.recv();
            let peer_recv = self.peer_channel.recv();

            tokio::select! {
                frame = rf_recv => {
                    if let Ok(frame) = frame {
                        self.handle_frame(frame).await;
                    }
                }
                frame = peer_recv => {
                    if let Ok(frame) = frame {
                        self.handle_frame(frame).await;
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, frame: Frame) {
        let message = match decode_frame(&frame.bytes) {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "dropped malformed frame");
                return;
            }
        };

        match message {
            Message::Deliver(body) => {
                // `Frame` carries no sender identity at this layer (spec.md's
                // wire format has no per-frame peer field outside Announce),
                // so peer demotion bookkeeping is keyed on a shared sentinel
                // here rather than a real callsign.
                match self.reassembler.accept_delivery("unknown-peer", &body).await {
                    Ok((outcome, ack)) => {
                        debug!(?outcome, "chunk delivery accepted");
                        let object_id = hex::encode(body.object_id);
                        self.send_ack(&object_id, ack).await;

                        if matches!(outcome, DeliveryOutcome::Stored | DeliveryOutcome::Completed) {
                            let transfer_id = self.object_transfers.get(&object_id).map(|v| v.clone());
                            if let Some(handle) = transfer_id.and_then(|id| self.transfers.get(&id).map(|h| h.clone())) {
                                let _ = handle.transition(TransferEvent::FirstChunkDispatched);
                                let _ = handle.transition(TransferEvent::ChunkAcknowledged {
                                    index: body.index,
                                    bytes: body.length as u64,
                                });
                                if outcome == DeliveryOutcome::Completed {
                                    let _ = handle.transition(TransferEvent::Sealed);
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "chunk delivery rejected"),
                }
            }
            Message::Ack(body) => {
                let object_id = hex::encode(body.object_id);
                if body.status == AckStatus::Ok {
                    if let Some(transfer_id) = self.object_transfers.get(&object_id) {
                        let _ = self.retry.on_success(&transfer_id, body.index);
                    }
                }
            }
            Message::Cancel(body) => {
                let _ = self.cancel(&body.transfer_id);
            }
            Message::Announce(body) => {
                let object_id = hex::encode(body.object_id);
                self.record_availability(&object_id, &body.availability);
            }
            Message::Have(body) => {
                let object_id = hex::encode(body.object_id);
                self.record_availability(&object_id, &body.availability);
            }
            Message::Discover(_) | Message::Request(_) => {
                debug!("swarm discovery message received, ignored by this dispatch path");
            }
        }
    }

    /// Send an `Ack` back for a delivered chunk. There's no subcarrier or
    /// peer identity attached to the inbound `Frame`, so the destination is
    /// resolved the same way outbound dispatch picks one: the transfer's
    /// known peer set, falling back to RF broadcast.
    async fn send_ack(&self, object_id: &str, ack: AckBody) {
        let bytes = encode_frame(&Message::Ack(ack));
        let transfer_id = self.object_transfers.get(object_id).map(|v| v.clone());
        let peer = transfer_id
            .and_then(|id| self.peer_targets.get(&id).map(|p| p.clone()))
            .and_then(|peers| peers.first().cloned());

        let result = match peer {
            Some(peer) => self.peer_channel.send(&peer, bytes, Duration::from_secs(5)).await,
            None => self.rf.send(0, bytes, Duration::from_secs(5)).await,
        };
        if let Err(e) = result {
            warn!(error = %e, object_id, "failed to send ack");
        }
    }
}
