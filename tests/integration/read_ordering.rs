//! Integration test: ordering under concurrency.
//!
//! Children of a compound resolve in parallel with adversarial latencies;
//! the bytes delivered by the reader must still be the single-threaded
//! in-order concatenation.

use std::sync::Arc;

use silt_blob::{Blob, BlobLeaf, BlobReader, CompoundBlob, Future, ReaderOptions};
use silt_chunks::{MemoryStore, SlowSource};
use silt_integration_tests::{build_tree, put_node, test_data_seeded};
use silt_types::Ref;

/// Store `parts` as leaves and return (compound blob, refs).
async fn flat_tree(store: &MemoryStore, parts: &[Vec<u8>]) -> (Blob, Vec<Ref>) {
    let mut futures = Vec::new();
    let mut offsets = Vec::new();
    let mut refs = Vec::new();
    let mut total = 0u64;
    for part in parts {
        let r = put_node(store, &Blob::Leaf(BlobLeaf::new(part.clone()))).await;
        refs.push(r);
        futures.push(Future::from_ref(r));
        total += part.len() as u64;
        offsets.push(total);
    }
    (
        Blob::Compound(CompoundBlob::new(futures, offsets).unwrap()),
        refs,
    )
}

#[tokio::test]
async fn test_reverse_latency_schedule_preserves_order() {
    let store = MemoryStore::new();
    let parts: Vec<Vec<u8>> = (0..8u64).map(|i| test_data_seeded(64, i)).collect();
    let (blob, refs) = flat_tree(&store, &parts).await;

    // Earliest children resolve last.
    let mut slow = SlowSource::new(Arc::new(store));
    for (i, r) in refs.iter().enumerate() {
        slow = slow.delay_for(*r, (refs.len() - i) as u64 * 10);
    }

    let mut reader = BlobReader::new(blob, Arc::new(slow));
    assert_eq!(reader.read_to_end().await.unwrap(), parts.concat());
}

#[tokio::test]
async fn test_random_latency_deep_tree_preserves_order() {
    let store = MemoryStore::new();
    let data = test_data_seeded(2000, 77);
    let r = build_tree(&store, &data, 3, 4).await;

    let slow = SlowSource::new(Arc::new(store)).latency(0, 15).seed(1234);
    let mut reader = BlobReader::open(Arc::new(slow), r).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), data);
}

#[tokio::test]
async fn test_single_deref_lane_matches_parallel_result() {
    let store = MemoryStore::new();
    let data = test_data_seeded(1500, 21);
    let r = build_tree(&store, &data, 2, 6).await;
    let store = Arc::new(store);

    let serial = ReaderOptions {
        buffer: 1,
        max_concurrent_derefs: 1,
    };
    let mut reader = BlobReader::open_with_options(store.clone(), r, serial)
        .await
        .unwrap();
    let serial_bytes = reader.read_to_end().await.unwrap();

    let parallel = ReaderOptions {
        buffer: 4,
        max_concurrent_derefs: 8,
    };
    let mut reader = BlobReader::open_with_options(store, r, parallel)
        .await
        .unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), serial_bytes);
    assert_eq!(serial_bytes, data);
}

#[tokio::test]
async fn test_seek_mid_stream_under_latency() {
    let store = MemoryStore::new();
    let data = test_data_seeded(1200, 8);
    let r = build_tree(&store, &data, 2, 4).await;

    let slow = SlowSource::new(Arc::new(store)).latency(0, 10).seed(5);
    let mut reader = BlobReader::open(Arc::new(slow), r).await.unwrap();

    // Read a prefix, jump, and confirm the traversal restarted cleanly.
    let mut buf = [0u8; 100];
    let n = reader.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], &data[..n]);

    reader.seek(std::io::SeekFrom::Start(900)).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), &data[900..]);
}
