//! Building blob trees from byte sequences.

use bytes::Bytes;
use silt_chunks::ChunkStore;
use silt_types::Ref;
use tracing::debug;

use crate::blob::{Blob, BlobLeaf, CompoundBlob};
use crate::error::BlobError;
use crate::future::Future;

/// Default maximum leaf payload: 64 KB.
const DEFAULT_LEAF_SIZE: usize = 64 * 1024;

/// Default children per compound node.
const DEFAULT_FAN_OUT: usize = 64;

/// Builds a blob tree from a byte sequence, storing every node as a chunk.
///
/// Input is split into leaves of at most `leaf_size` bytes (the last leaf
/// may be smaller), then grouped `fan_out` at a time into compound nodes,
/// level by level, until a single root remains. Children are always stored
/// before the compound that references them, so a reader observing the
/// returned ref finds the whole tree. Empty input stores the empty leaf.
#[derive(Debug, Clone, Copy)]
pub struct BlobWriter {
    leaf_size: usize,
    fan_out: usize,
}

impl BlobWriter {
    /// A writer with default leaf size and fan-out.
    pub fn new() -> Self {
        Self {
            leaf_size: DEFAULT_LEAF_SIZE,
            fan_out: DEFAULT_FAN_OUT,
        }
    }

    /// Set the maximum leaf payload size in bytes (minimum 1).
    pub fn leaf_size(mut self, n: usize) -> Self {
        self.leaf_size = n.max(1);
        self
    }

    /// Set the number of children per compound node (minimum 2).
    pub fn fan_out(mut self, n: usize) -> Self {
        self.fan_out = n.max(2);
        self
    }

    /// Store `data` as a blob tree and return the root ref.
    pub async fn write(&self, store: &dyn ChunkStore, data: &[u8]) -> Result<Ref, BlobError> {
        if data.is_empty() {
            return store_node(store, &Blob::Leaf(BlobLeaf::new(Bytes::new()))).await;
        }

        // (subtree ref, subtree byte length) for the current level.
        let mut level: Vec<(Ref, u64)> = Vec::with_capacity(data.len().div_ceil(self.leaf_size));
        for part in data.chunks(self.leaf_size) {
            let leaf = Blob::Leaf(BlobLeaf::new(part.to_vec()));
            let r = store_node(store, &leaf).await?;
            level.push((r, part.len() as u64));
        }
        debug!(leaves = level.len(), total = data.len(), "stored leaf level");

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(self.fan_out));
            for group in level.chunks(self.fan_out) {
                let mut futures = Vec::with_capacity(group.len());
                let mut offsets = Vec::with_capacity(group.len());
                let mut total = 0u64;
                for (r, len) in group {
                    futures.push(Future::from_ref(*r));
                    total += len;
                    offsets.push(total);
                }
                let compound = Blob::Compound(CompoundBlob::new(futures, offsets)?);
                let r = store_node(store, &compound).await?;
                next.push((r, total));
            }
            level = next;
        }

        Ok(level[0].0)
    }
}

impl Default for BlobWriter {
    fn default() -> Self {
        Self::new()
    }
}

async fn store_node(store: &dyn ChunkStore, blob: &Blob) -> Result<Ref, BlobError> {
    let mut writer = store.put();
    writer.write(&blob.encode())?;
    Ok(writer.finish().await?)
}
