use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::chunk::{ChunkStoreError, SharedChunkStore};
use crate::swarm::{AckBody, AckStatus, DeliverBody};

use super::error::{ReassemblerError, Result};
use super::types::{DeliveryOutcome, DEMOTION_THRESHOLD};

/// Verify-then-store pipeline for inbound chunks (spec.md §4.1, §4.6).
/// `ChunkStore::put_chunk` does the actual checksum check against the
/// manifest; this layer turns the result into an `Ack` and tracks which
/// peers keep sending corrupt data for an object.
pub struct Reassembler {
    store: SharedChunkStore,
    failures: Mutex<HashMap<(String, String), u32>>,
    demoted: Mutex<HashMap<String, Vec<String>>>,
}

impl Reassembler {
    pub fn new(store: SharedChunkStore) -> Self {
        Self {
            store,
            failures: Mutex::new(HashMap::new()),
            demoted: Mutex::new(HashMap::new()),
        }
    }

    /// Peers demoted (untrusted) for `object_id` after repeated checksum
    /// failures.
    pub fn demoted_peers(&self, object_id: &str) -> Vec<String> {
        self.demoted.lock().get(object_id).cloned().unwrap_or_default()
    }

    pub fn is_demoted(&self, object_id: &str, peer: &str) -> bool {
        self.demoted
            .lock()
            .get(object_id)
            .map(|peers| peers.iter().any(|p| p == peer))
            .unwrap_or(false)
    }

    fn record_success(&self, object_id: &str, peer: &str) {
        self.failures.lock().remove(&(object_id.to_string(), peer.to_string()));
    }

    fn record_failure(&self, object_id: &str, peer: &str) -> u32 {
        let mut failures = self.failures.lock();
        let count = failures.entry((object_id.to_string(), peer.to_string())).or_insert(0);
        *count += 1;
        let count = *count;
        if count >= DEMOTION_THRESHOLD {
            let mut demoted = self.demoted.lock();
            let peers = demoted.entry(object_id.to_string()).or_default();
            if !peers.iter().any(|p| p == peer) {
                warn!(object_id, peer, "peer demoted after repeated checksum failures");
                peers.push(peer.to_string());
            }
        }
        count
    }

    /// Feed one delivered chunk through verification and storage. Returns
    /// both the outcome and the `Ack` to send back to `peer`.
    pub async fn accept(
        &self,
        object_id: &str,
        peer: &str,
        index: u32,
        bytes: Bytes,
    ) -> Result<(DeliveryOutcome, AckBody)> {
        if self.store.has_chunk(object_id, index).await {
            self.record_success(object_id, peer);
            return Ok((DeliveryOutcome::Duplicate, ack(object_id, index, AckStatus::Ok)?));
        }

        match self.store.put_chunk(object_id, index, bytes).await {
            Ok(()) => {
                self.record_success(object_id, peer);
                let availability = self.store.availability(object_id).await?;
                if availability.is_complete() {
                    self.store.seal_object(object_id).await?;
                    info!(object_id, "object reassembled from all chunks");
                    Ok((DeliveryOutcome::Completed, ack(object_id, index, AckStatus::Ok)?))
                } else {
                    Ok((DeliveryOutcome::Stored, ack(object_id, index, AckStatus::Ok)?))
                }
            }
            Err(ChunkStoreError::ChecksumMismatch { .. }) => {
                self.record_failure(object_id, peer);
                Err(ReassemblerError::ChecksumMismatch {
                    object_id: object_id.to_string(),
                    index,
                    peer: peer.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Same as `accept`, but takes the wire `DeliverBody` directly and
    /// resolves `object_id` from its raw 32-byte form.
    pub async fn accept_delivery(&self, peer: &str, body: &DeliverBody) -> Result<(DeliveryOutcome, AckBody)> {
        let object_id = hex::encode(body.object_id);
        self.accept(&object_id, peer, body.index, body.bytes.clone()).await
    }
}

fn ack(object_id: &str, index: u32, status: AckStatus) -> Result<AckBody> {
    let raw = hex::decode(object_id).map_err(|_| ReassemblerError::Incomplete(object_id.to_string()))?;
    let mut id = [0u8; 32];
    if raw.len() != 32 {
        return Err(ReassemblerError::Incomplete(object_id.to_string()));
    }
    id.copy_from_slice(&raw);
    Ok(AckBody { object_id: id, index, status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkStore, ObjectMetadata};
    use std::sync::Arc;

    async fn store_with_object() -> (Arc<ChunkStore>, String, Vec<Bytes>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::new(dir.path(), 4, 1024 * 1024));
        let data = Bytes::from_static(b"abcdefgh");
        let manifest = store.put_object(data.clone(), ObjectMetadata::default()).await.unwrap();
        let chunks = vec![data.slice(0..4), data.slice(4..8)];
        (store, manifest.object_id, chunks)
    }

    #[tokio::test]
    async fn accept_stores_then_completes() {
        let (store, object_id, chunks) = store_with_object().await;
        let reassembler = Reassembler::new(store);

        let (outcome, ack) = reassembler.accept(&object_id, "peer-a", 0, chunks[0].clone()).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Stored);
        assert_eq!(ack.status, AckStatus::Ok);

        let (outcome, _) = reassembler.accept(&object_id, "peer-a", 1, chunks[1].clone()).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Completed);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_a_noop() {
        let (store, object_id, chunks) = store_with_object().await;
        let reassembler = Reassembler::new(store);
        reassembler.accept(&object_id, "peer-a", 0, chunks[0].clone()).await.unwrap();
        let (outcome, _) = reassembler.accept(&object_id, "peer-b", 0, chunks[0].clone()).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Duplicate);
    }

    #[tokio::test]
    async fn repeated_checksum_failures_demote_peer() {
        let (store, object_id, _chunks) = store_with_object().await;
        let reassembler = Reassembler::new(store);
        let bad = Bytes::from_static(b"xxxx");

        for _ in 0..DEMOTION_THRESHOLD {
            let result = reassembler.accept(&object_id, "peer-bad", 0, bad.clone()).await;
            assert!(result.is_err());
        }

        assert!(reassembler.is_demoted(&object_id, "peer-bad"));
    }
}
