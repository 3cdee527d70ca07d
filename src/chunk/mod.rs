//! Content-addressed object storage: chunking, checksums, and the on-disk
//! `<object_id>/manifest` + `<object_id>/chunks/<index>` layout (spec.md §4.1, §6).

pub mod error;
pub mod store;
pub mod types;

pub use error::{ChunkStoreError, Result as ChunkStoreResult};
pub use store::{ChunkStore, SharedChunkStore};
pub use types::{
    Availability, Chunk, ChunkState, ChunkStateKind, ErrorKindTag, ObjectManifest, ObjectMetadata,
    Priority,
};
