//! Core traits for chunk storage.

use bytes::Bytes;
use silt_types::Ref;

use crate::error::StoreError;

/// Read-only access to chunks by content hash.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Chunk payloads travel as [`Bytes`] to keep hand-offs zero-copy.
#[async_trait::async_trait]
pub trait ChunkSource: Send + Sync {
    /// Retrieve the bytes of a chunk. Returns `None` if the hash is unknown.
    ///
    /// Absence is not an error. An error here means a chunk the store
    /// claims to hold could not be served.
    async fn get(&self, r: Ref) -> Result<Option<Bytes>, StoreError>;
}

/// A store of immutable chunks anchored by a single root ref.
///
/// Chunks are write-once: a chunk's identity is the hash of its bytes, so
/// writing the same bytes twice stores one chunk. The root ref is the only
/// mutable state, and it advances only by compare-and-swap.
#[async_trait::async_trait]
pub trait ChunkStore: ChunkSource {
    /// Begin writing a chunk. The returned writer buffers bytes and
    /// persists them on [`ChunkWriter::finish`].
    fn put(&self) -> Box<dyn ChunkWriter>;

    /// The current root ref. [`Ref::zero`] when no root has been set.
    async fn root(&self) -> Result<Ref, StoreError>;

    /// Atomically set the root to `new` iff it currently equals `expected`.
    ///
    /// Returns `false` on a stale `expected` (a normal outcome, not an
    /// error). On success, every chunk written through this store before
    /// the call is durable before the new root becomes visible.
    async fn update_root(&self, new: Ref, expected: Ref) -> Result<bool, StoreError>;
}

/// In-progress chunk write.
///
/// The writer is in the `Open` state until the first successful
/// [`finish`](Self::finish), which computes the content hash, persists the
/// chunk if it is not already stored, and transitions to `Finalized`.
/// Further `finish` calls are no-ops returning the same ref; further
/// `write` calls are [`StoreError::Misuse`]. Finishing a never-written
/// writer stores the empty chunk.
#[async_trait::async_trait]
pub trait ChunkWriter: Send {
    /// Append bytes to the chunk being written.
    fn write(&mut self, data: &[u8]) -> Result<(), StoreError>;

    /// Finalize the chunk and return its content hash.
    async fn finish(&mut self) -> Result<Ref, StoreError>;
}
