//! Integration test: root compare-and-swap.
//!
//! The root file is the only cross-process shared mutable object; advisory
//! locks make its CAS atomic between cooperating store handles.

use silt_chunks::{ChunkStore, FileStore};
use silt_integration_tests::put_chunk;
use silt_types::Ref;
use tempfile::TempDir;

#[tokio::test]
async fn test_root_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap();

    assert!(store.root().await.unwrap().is_zero());

    let a = put_chunk(&store, b"state a").await;
    assert!(store.update_root(a, Ref::zero()).await.unwrap());
    assert_eq!(store.root().await.unwrap(), a);

    // A second writer still holding the zero root loses.
    let b = put_chunk(&store, b"state b").await;
    assert!(!store.update_root(b, Ref::zero()).await.unwrap());
    assert_eq!(store.root().await.unwrap(), a);

    let c = put_chunk(&store, b"state c").await;
    assert!(store.update_root(c, a).await.unwrap());
    assert_eq!(store.root().await.unwrap(), c);
}

#[tokio::test]
async fn test_root_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let r1 = {
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.root().await.unwrap().is_zero());
        let r1 = put_chunk(&store, b"committed state").await;
        assert!(store.update_root(r1, Ref::zero()).await.unwrap());
        r1
    };

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.root().await.unwrap(), r1);
}

#[tokio::test]
async fn test_concurrent_cas_from_two_handles_has_one_winner() {
    let dir = TempDir::new().unwrap();

    // All writes go through one handle (single-writer store); the second
    // handle opens afterwards and stands in for another process
    // contending on the root file.
    let p1 = FileStore::open(dir.path()).unwrap();
    let r1 = put_chunk(&p1, b"process one proposal").await;
    let r2 = put_chunk(&p1, b"process two proposal").await;
    let p2 = FileStore::open(dir.path()).unwrap();

    let h1 = tokio::spawn({
        let p1 = p1.clone();
        async move { p1.update_root(r1, Ref::zero()).await.unwrap() }
    });
    let h2 = tokio::spawn({
        let p2 = p2.clone();
        async move { p2.update_root(r2, Ref::zero()).await.unwrap() }
    });

    let (w1, w2) = (h1.await.unwrap(), h2.await.unwrap());
    assert!(w1 ^ w2, "exactly one CAS must win, got {w1}/{w2}");

    let expected = if w1 { r1 } else { r2 };
    assert_eq!(p1.root().await.unwrap(), expected);
    assert_eq!(p2.root().await.unwrap(), expected);
}

#[tokio::test]
async fn test_loser_can_retry_against_new_root() {
    let dir = TempDir::new().unwrap();
    let p1 = FileStore::open(dir.path()).unwrap();
    let r1 = put_chunk(&p1, b"winner").await;
    let r2 = put_chunk(&p1, b"loser retries").await;
    let p2 = FileStore::open(dir.path()).unwrap();

    assert!(p1.update_root(r1, Ref::zero()).await.unwrap());
    assert!(!p2.update_root(r2, Ref::zero()).await.unwrap());

    // The loser re-reads the root and retries the CAS against it.
    let current = p2.root().await.unwrap();
    assert_eq!(current, r1);
    assert!(p2.update_root(r2, current).await.unwrap());
    assert_eq!(p1.root().await.unwrap(), r2);
}
