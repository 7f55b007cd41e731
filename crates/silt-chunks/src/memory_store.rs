//! In-memory chunk store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::{Bytes, BytesMut};
use silt_types::{Ref, RefHasher};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{ChunkSource, ChunkStore, ChunkWriter};

/// In-memory [`ChunkStore`] backed by a `RwLock<HashMap>`.
///
/// Volatile; useful for tests and for callers that opt out of the file
/// store. Carries the same root compare-and-swap contract as [`FileStore`].
///
/// [`FileStore`]: crate::FileStore
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemInner>,
}

#[derive(Default)]
struct MemInner {
    chunks: RwLock<HashMap<Ref, Bytes>>,
    root: RwLock<Ref>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct chunks stored.
    pub fn len(&self) -> usize {
        self.inner.chunks.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ChunkSource for MemoryStore {
    async fn get(&self, r: Ref) -> Result<Option<Bytes>, StoreError> {
        let chunks = self.inner.chunks.read().expect("lock poisoned");
        Ok(chunks.get(&r).cloned())
    }
}

#[async_trait::async_trait]
impl ChunkStore for MemoryStore {
    fn put(&self) -> Box<dyn ChunkWriter> {
        Box::new(MemoryChunkWriter {
            inner: self.inner.clone(),
            state: WriterState::Open {
                buffer: BytesMut::new(),
                hasher: RefHasher::new(),
            },
        })
    }

    async fn root(&self) -> Result<Ref, StoreError> {
        Ok(*self.inner.root.read().expect("lock poisoned"))
    }

    async fn update_root(&self, new: Ref, expected: Ref) -> Result<bool, StoreError> {
        let mut root = self.inner.root.write().expect("lock poisoned");
        if *root != expected {
            return Ok(false);
        }
        *root = new;
        Ok(true)
    }
}

enum WriterState {
    Open { buffer: BytesMut, hasher: RefHasher },
    Finalized(Ref),
}

struct MemoryChunkWriter {
    inner: Arc<MemInner>,
    state: WriterState,
}

#[async_trait::async_trait]
impl ChunkWriter for MemoryChunkWriter {
    fn write(&mut self, data: &[u8]) -> Result<(), StoreError> {
        match &mut self.state {
            WriterState::Finalized(_) => {
                Err(StoreError::Misuse("write() called after finish()"))
            }
            WriterState::Open { buffer, hasher } => {
                buffer.extend_from_slice(data);
                hasher.update(data);
                Ok(())
            }
        }
    }

    async fn finish(&mut self) -> Result<Ref, StoreError> {
        let (buffer, hasher) = match std::mem::replace(
            &mut self.state,
            WriterState::Finalized(Ref::zero()),
        ) {
            WriterState::Finalized(r) => {
                self.state = WriterState::Finalized(r);
                return Ok(r);
            }
            WriterState::Open { buffer, hasher } => (buffer.freeze(), hasher),
        };

        let r = hasher.finish();
        self.state = WriterState::Finalized(r);

        let mut chunks = self.inner.chunks.write().expect("lock poisoned");
        if !chunks.contains_key(&r) {
            debug!(chunk = %r, len = buffer.len(), "stored chunk in memory");
            chunks.insert(r, buffer);
        }
        Ok(r)
    }
}
