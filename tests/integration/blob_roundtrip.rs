//! Integration test: blob round-trips.
//!
//! Bytes written as leaf and compound trees — including deep trees of
//! every shape — come back identical through the streaming reader, for
//! any read buffer size and from any seek target.

use std::io::SeekFrom;
use std::sync::Arc;

use silt_blob::{Blob, BlobLeaf, BlobReader, BlobWriter};
use silt_chunks::FileStore;
use silt_integration_tests::{build_tree, put_node, read_all, test_data_seeded};
use tempfile::TempDir;

fn file_store() -> (FileStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    (store, dir)
}

#[tokio::test]
async fn test_leaf_roundtrip_various_sizes() {
    let (store, _dir) = file_store();

    for (i, len) in [0usize, 1, 2, 255, 256, 4096].into_iter().enumerate() {
        let data = test_data_seeded(len, i as u64);
        let r = put_node(&store, &Blob::Leaf(BlobLeaf::new(data.clone()))).await;
        let got = read_all(Arc::new(store.clone()), r).await;
        assert_eq!(got, data, "leaf of {len} bytes");
    }
}

#[tokio::test]
async fn test_compound_partitions_roundtrip() {
    let (store, _dir) = file_store();
    let data = test_data_seeded(120, 7);

    // k = 1: a single leaf holds the whole sequence.
    let r = build_tree(&store, &data, 0, 2).await;
    assert_eq!(read_all(Arc::new(store.clone()), r).await, data);

    // k = 2..8: single-level compounds of every width.
    for parts in 2..=8usize {
        let r = build_tree(&store, &data, 1, parts).await;
        let got = read_all(Arc::new(store.clone()), r).await;
        assert_eq!(got, data, "partition into {parts} parts");
    }
}

#[tokio::test]
async fn test_deep_trees_all_shapes() {
    let (store, _dir) = file_store();
    let data = test_data_seeded(3000, 42);

    for depth in 1..=5usize {
        for fan_out in 2..=8usize {
            let r = build_tree(&store, &data, depth, fan_out).await;
            let got = read_all(Arc::new(store.clone()), r).await;
            assert_eq!(got, data, "depth {depth}, fan-out {fan_out}");
        }
    }
}

#[tokio::test]
async fn test_partial_reads_deliver_exact_concatenation() {
    let (store, _dir) = file_store();
    let data = test_data_seeded(2500, 99);
    let r = build_tree(&store, &data, 3, 4).await;
    let store = Arc::new(store);

    for buf_size in [1usize, 2, 13, 100, 4096] {
        let mut reader = BlobReader::open(store.clone(), r).await.unwrap();
        let mut got = Vec::new();
        let mut buf = vec![0u8; buf_size];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, data, "buffer size {buf_size}");
    }
}

#[tokio::test]
async fn test_seek_then_read_tail_from_any_target() {
    let (store, _dir) = file_store();
    let data = test_data_seeded(1000, 5);
    let r = build_tree(&store, &data, 2, 5).await;
    let store = Arc::new(store);

    let len = data.len() as u64;
    let targets = [0u64, 1, 17, len / 2, len - 1, len];
    for t in targets {
        let mut reader = BlobReader::open(store.clone(), r).await.unwrap();
        assert_eq!(reader.seek(SeekFrom::Start(t)).await.unwrap(), t);
        let tail = reader.read_to_end().await.unwrap();
        assert_eq!(tail, &data[t as usize..], "seek target {t}");
    }
}

#[tokio::test]
async fn test_seek_current_and_end_agree_with_start() {
    let (store, _dir) = file_store();
    let data = test_data_seeded(600, 11);
    let r = build_tree(&store, &data, 2, 3).await;
    let store = Arc::new(store);

    let mut reader = BlobReader::open(store.clone(), r).await.unwrap();
    let len = data.len() as u64;

    // End-relative lands where Start would.
    assert_eq!(reader.seek(SeekFrom::End(-100)).await.unwrap(), len - 100);
    let tail_end = reader.read_to_end().await.unwrap();

    let mut reader = BlobReader::open(store.clone(), r).await.unwrap();
    reader.seek(SeekFrom::Start(len - 100)).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), tail_end);

    // Current-relative composes.
    let mut reader = BlobReader::open(store, r).await.unwrap();
    reader.seek(SeekFrom::Start(200)).await.unwrap();
    assert_eq!(reader.seek(SeekFrom::Current(50)).await.unwrap(), 250);
    assert_eq!(reader.read_to_end().await.unwrap(), &data[250..]);
}

#[tokio::test]
async fn test_blob_writer_tree_reads_back_over_file_store() {
    let (store, _dir) = file_store();
    let data = test_data_seeded(50_000, 123);

    let writer = BlobWriter::new().leaf_size(512).fan_out(4);
    let r = writer.write(&store, &data).await.unwrap();

    let mut reader = BlobReader::open(Arc::new(store), r).await.unwrap();
    assert_eq!(reader.len(), data.len() as u64);
    assert_eq!(reader.read_to_end().await.unwrap(), data);
}
