use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use blake3::Hasher;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, info, warn};

use super::error::{ChunkStoreError, Result};
use super::types::{Availability, Chunk, ObjectManifest, ObjectMetadata};

const MANIFEST_FILE: &str = "manifest";
const CHUNKS_DIR: &str = "chunks";

/// Content-addressed storage of objects and their chunks, laid out on disk
/// as `<object_id>/manifest` + `<object_id>/chunks/<index>` (spec.md §6).
/// Eviction is LRU over unpinned objects; transfers pin the objects they
/// depend on so in-flight downloads are never evicted out from under them.
pub struct ChunkStore {
    base_dir: PathBuf,
    default_chunk_size: u32,
    max_bytes: u64,
    lru: Mutex<LruState>,
}

#[derive(Default)]
struct LruState {
    recency: Vec<String>,
    pinned: HashMap<String, u32>,
    sizes: HashMap<String, u64>,
    used_bytes: u64,
}

impl ChunkStore {
    pub fn new(base_dir: impl Into<PathBuf>, default_chunk_size: u32, max_bytes: u64) -> Self {
        Self {
            base_dir: base_dir.into(),
            default_chunk_size,
            max_bytes,
            lru: Mutex::new(LruState::default()),
        }
    }

    fn object_dir(&self, object_id: &str) -> PathBuf {
        self.base_dir.join(object_id)
    }

    fn chunk_path(&self, object_id: &str, index: u32) -> PathBuf {
        self.object_dir(object_id).join(CHUNKS_DIR).join(index.to_string())
    }

    fn manifest_path(&self, object_id: &str) -> PathBuf {
        self.object_dir(object_id).join(MANIFEST_FILE)
    }

    /// Pin an object so it is never chosen for LRU eviction. Transfers pin
    /// on admission and unpin on completion/cancellation.
    pub fn pin(&self, object_id: &str) {
        *self.lru.lock().pinned.entry(object_id.to_string()).or_insert(0) += 1;
    }

    pub fn unpin(&self, object_id: &str) {
        let mut lru = self.lru.lock();
        if let Some(count) = lru.pinned.get_mut(object_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                lru.pinned.remove(object_id);
            }
        }
    }

    fn touch(&self, object_id: &str) {
        let mut lru = self.lru.lock();
        lru.recency.retain(|id| id != object_id);
        lru.recency.push(object_id.to_string());
    }

    /// Split `bytes` into fixed-size chunks, checksum each, and persist the
    /// manifest plus chunk blobs. Returns the resulting manifest.
    pub async fn put_object(&self, bytes: Bytes, metadata: ObjectMetadata) -> Result<ObjectManifest> {
        let chunk_size = self.default_chunk_size;
        let total_chunks = ((bytes.len() as u64 + chunk_size as u64 - 1) / chunk_size as u64).max(1) as u32;

        let mut object_hasher = Hasher::new();
        object_hasher.update(&bytes);
        let object_id = object_hasher.finalize().to_hex().to_string();

        self.ensure_capacity(bytes.len() as u64, &object_id).await?;

        let mut checksums = Vec::with_capacity(total_chunks as usize);
        fs::create_dir_all(self.object_dir(&object_id).join(CHUNKS_DIR)).await?;

        for index in 0..total_chunks {
            let start = (index as u64 * chunk_size as u64) as usize;
            let end = std::cmp::min(start + chunk_size as usize, bytes.len());
            let slice = bytes.slice(start..end);

            let mut hasher = Hasher::new();
            hasher.update(&slice);
            let checksum = *hasher.finalize().as_bytes();
            checksums.push(checksum);

            fs::write(self.chunk_path(&object_id, index), &slice).await?;
        }

        let manifest = ObjectManifest {
            object_id: object_id.clone(),
            size: bytes.len() as u64,
            chunk_size,
            total_chunks,
            checksums,
            metadata,
        };

        let json = serde_json::to_vec_pretty(&manifest)?;
        fs::write(self.manifest_path(&object_id), json).await?;

        self.touch(&object_id);
        {
            let mut lru = self.lru.lock();
            lru.sizes.insert(object_id.clone(), bytes.len() as u64);
            lru.used_bytes += bytes.len() as u64;
        }

        info!(object_id = %object_id, total_chunks, "object published");
        Ok(manifest)
    }

    pub async fn manifest(&self, object_id: &str) -> Result<ObjectManifest> {
        let data = fs::read(self.manifest_path(object_id))
            .await
            .map_err(|_| ChunkStoreError::ObjectNotFound(object_id.to_string()))?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub async fn has_chunk(&self, object_id: &str, index: u32) -> bool {
        fs::metadata(self.chunk_path(object_id, index)).await.is_ok()
    }

    pub async fn get_chunk(&self, object_id: &str, index: u32) -> Result<Chunk> {
        let manifest = self.manifest(object_id).await?;
        if index >= manifest.total_chunks {
            return Err(ChunkStoreError::IndexOutOfRange {
                object_id: object_id.to_string(),
                index,
                total: manifest.total_chunks,
            });
        }
        let path = self.chunk_path(object_id, index);
        let data = fs::read(&path)
            .await
            .map_err(|_| ChunkStoreError::ChunkNotPresent {
                object_id: object_id.to_string(),
                index,
            })?;

        self.touch(object_id);
        Ok(Chunk {
            object_id: object_id.to_string(),
            index,
            offset: manifest.chunk_offset(index),
            length: data.len() as u32,
            checksum: manifest.checksums[index as usize],
            data: Bytes::from(data),
        })
    }

    /// Write a received chunk, verifying it against the manifest checksum.
    /// `ChecksumMismatch` is not recoverable locally — the caller re-requests.
    pub async fn put_chunk(&self, object_id: &str, index: u32, data: Bytes) -> Result<()> {
        let manifest = self.manifest(object_id).await?;
        if index >= manifest.total_chunks {
            return Err(ChunkStoreError::IndexOutOfRange {
                object_id: object_id.to_string(),
                index,
                total: manifest.total_chunks,
            });
        }

        let mut hasher = Hasher::new();
        hasher.update(&data);
        let checksum = *hasher.finalize().as_bytes();
        if checksum != manifest.checksums[index as usize] {
            warn!(object_id, index, "chunk checksum mismatch on put");
            return Err(ChunkStoreError::ChecksumMismatch {
                object_id: object_id.to_string(),
                index,
            });
        }

        self.ensure_capacity(data.len() as u64, object_id).await?;
        fs::create_dir_all(self.object_dir(object_id).join(CHUNKS_DIR)).await?;
        fs::write(self.chunk_path(object_id, index), &data).await?;

        self.touch(object_id);
        {
            let mut lru = self.lru.lock();
            *lru.sizes.entry(object_id.to_string()).or_insert(0) += data.len() as u64;
            lru.used_bytes += data.len() as u64;
        }
        debug!(object_id, index, "chunk stored");
        Ok(())
    }

    pub async fn availability(&self, object_id: &str) -> Result<Availability> {
        let manifest = self.manifest(object_id).await?;
        let mut availability = Availability::new(manifest.total_chunks);
        for index in 0..manifest.total_chunks {
            if self.has_chunk(object_id, index).await {
                availability.set(index);
            }
        }
        Ok(availability)
    }

    /// Verify all chunks are present and the concatenation hashes to
    /// `object_id`. Succeeds iff every index 0..N-1 is present and the hash
    /// matches; partial objects remain observable for swarm seeding but are
    /// never served as complete bytes before this passes.
    pub async fn seal_object(&self, object_id: &str) -> Result<()> {
        let manifest = self.manifest(object_id).await?;
        let availability = self.availability(object_id).await?;
        if !availability.is_complete() {
            return Err(ChunkStoreError::NotSealed {
                missing: availability.missing().len(),
                total: manifest.total_chunks,
            });
        }

        let mut hasher = Hasher::new();
        for index in 0..manifest.total_chunks {
            let chunk = self.get_chunk(object_id, index).await?;
            hasher.update(&chunk.data);
        }
        let digest = hasher.finalize().to_hex().to_string();
        if digest != manifest.object_id {
            return Err(ChunkStoreError::SealHashMismatch(object_id.to_string()));
        }

        info!(object_id, "object sealed");
        Ok(())
    }

    /// Concatenate all chunks of a sealed object into one buffer.
    pub async fn read_sealed(&self, object_id: &str) -> Result<Bytes> {
        let manifest = self.manifest(object_id).await?;
        let mut buf = Vec::with_capacity(manifest.size as usize);
        for index in 0..manifest.total_chunks {
            let chunk = self.get_chunk(object_id, index).await?;
            buf.extend_from_slice(&chunk.data);
        }
        Ok(Bytes::from(buf))
    }

    async fn ensure_capacity(&self, incoming: u64, protect: &str) -> Result<()> {
        loop {
            let (used, over) = {
                let lru = self.lru.lock();
                (lru.used_bytes, lru.used_bytes + incoming > self.max_bytes)
            };
            if !over || self.max_bytes == 0 {
                let _ = used;
                return Ok(());
            }

            let victim = {
                let lru = self.lru.lock();
                lru.recency
                    .iter()
                    .find(|id| id.as_str() != protect && !lru.pinned.contains_key(*id))
                    .cloned()
            };

            match victim {
                Some(object_id) => self.evict(&object_id).await?,
                None => return Err(ChunkStoreError::StorageExhausted),
            }
        }
    }

    async fn evict(&self, object_id: &str) -> Result<()> {
        let freed = {
            let mut lru = self.lru.lock();
            lru.recency.retain(|id| id != object_id);
            let size = lru.sizes.remove(object_id).unwrap_or(0);
            lru.used_bytes = lru.used_bytes.saturating_sub(size);
            size
        };
        let _ = fs::remove_dir_all(self.object_dir(object_id)).await;
        warn!(object_id, freed, "evicted object by LRU");
        Ok(())
    }
}

pub type SharedChunkStore = Arc<ChunkStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_and_seal_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), 4, 1024 * 1024);

        let data = Bytes::from_static(b"0123456789ab");
        let manifest = store.put_object(data.clone(), ObjectMetadata::default()).await.unwrap();
        assert_eq!(manifest.total_chunks, 3);

        let avail = store.availability(&manifest.object_id).await.unwrap();
        assert!(avail.is_complete());

        store.seal_object(&manifest.object_id).await.unwrap();
        let read_back = store.read_sealed(&manifest.object_id).await.unwrap();
        assert_eq!(read_back, data);
    }

    #[tokio::test]
    async fn put_chunk_rejects_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), 4, 1024 * 1024);
        let manifest = store
            .put_object(Bytes::from_static(b"abcdefgh"), ObjectMetadata::default())
            .await
            .unwrap();

        let result = store
            .put_chunk(&manifest.object_id, 0, Bytes::from_static(b"xxxx"))
            .await;
        assert!(matches!(result, Err(ChunkStoreError::ChecksumMismatch { .. })));
    }

    #[tokio::test]
    async fn seal_fails_until_all_chunks_present() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), 4, 1024 * 1024);
        let manifest = store
            .put_object(Bytes::from_static(b"0123456789"), ObjectMetadata::default())
            .await
            .unwrap();

        let _ = fs::remove_file(store.chunk_path(&manifest.object_id, 1)).await;
        let result = store.seal_object(&manifest.object_id).await;
        assert!(matches!(result, Err(ChunkStoreError::NotSealed { .. })));
    }

    #[tokio::test]
    async fn pinned_objects_survive_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), 4, 12);

        let pinned = store
            .put_object(Bytes::from_static(b"aaaa"), ObjectMetadata::default())
            .await
            .unwrap();
        store.pin(&pinned.object_id);

        let evictable = store
            .put_object(Bytes::from_static(b"bbbb"), ObjectMetadata::default())
            .await
            .unwrap();

        // Forces eviction of one unpinned object; the pinned one must survive.
        let _third = store
            .put_object(Bytes::from_static(b"cccccccc"), ObjectMetadata::default())
            .await
            .unwrap();

        assert!(store.manifest(&pinned.object_id).await.is_ok());
        assert!(store.manifest(&evictable.object_id).await.is_err());
    }
}
