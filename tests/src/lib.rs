//! Shared helpers for silt integration tests.

use std::pin::Pin;
use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use silt_blob::{Blob, BlobLeaf, BlobReader, CompoundBlob, Future};
use silt_chunks::{ChunkSource, ChunkStore};
use silt_types::Ref;

/// Deterministic pseudo-random test data.
pub fn test_data_seeded(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// Store raw bytes as one chunk.
pub async fn put_chunk(store: &dyn ChunkStore, data: &[u8]) -> Ref {
    let mut writer = store.put();
    writer.write(data).unwrap();
    writer.finish().await.unwrap()
}

/// Store an encoded blob node as a chunk.
pub async fn put_node(store: &dyn ChunkStore, blob: &Blob) -> Ref {
    put_chunk(store, &blob.encode()).await
}

/// Read a whole stored blob back through the streaming reader.
pub async fn read_all(source: Arc<dyn ChunkSource>, r: Ref) -> Vec<u8> {
    let mut reader = BlobReader::open(source, r).await.unwrap();
    reader.read_to_end().await.unwrap()
}

/// Build and store a blob tree of exactly `depth` compound levels over
/// `data`, splitting as evenly as `fan_out` allows at each level.
///
/// Depth 0 stores a single leaf. Each recursion level produces one
/// compound whose children are the next level down, so the tree's shape is
/// fully controlled by the caller — unlike `BlobWriter`, which picks its
/// own depth.
pub fn build_tree<'a>(
    store: &'a dyn ChunkStore,
    data: &'a [u8],
    depth: usize,
    fan_out: usize,
) -> Pin<Box<dyn std::future::Future<Output = Ref> + Send + 'a>> {
    Box::pin(async move {
        if depth == 0 || data.len() < 2 {
            return put_node(store, &Blob::Leaf(BlobLeaf::new(data.to_vec()))).await;
        }

        let parts = fan_out.min(data.len());
        let base = data.len() / parts;
        let extra = data.len() % parts;

        let mut futures = Vec::with_capacity(parts);
        let mut offsets = Vec::with_capacity(parts);
        let mut consumed = 0usize;
        for i in 0..parts {
            let part_len = base + usize::from(i < extra);
            let part = &data[consumed..consumed + part_len];
            consumed += part_len;

            let child = build_tree(store, part, depth - 1, fan_out).await;
            futures.push(Future::from_ref(child));
            offsets.push(consumed as u64);
        }

        let compound = Blob::Compound(CompoundBlob::new(futures, offsets).unwrap());
        put_node(store, &compound).await
    })
}
