//! Lazy handles to blobs in a chunk store.

use std::fmt;
use std::sync::Arc;

use silt_chunks::ChunkSource;
use silt_types::Ref;
use tokio::sync::OnceCell;

use crate::blob::Blob;
use crate::error::BlobError;

/// A lazy handle to a blob: a ref, plus a memoized resolution.
///
/// Cloning is cheap and clones share the memoized value, so a future
/// resolved once in a tree traversal stays resolved for every holder.
#[derive(Clone)]
pub struct Future {
    r: Ref,
    cell: Arc<OnceCell<Arc<Blob>>>,
}

impl Future {
    /// A future that is already resolved to `blob`.
    pub fn from_value(blob: Blob) -> Self {
        let r = blob.compute_ref();
        Self {
            r,
            cell: Arc::new(OnceCell::new_with(Some(Arc::new(blob)))),
        }
    }

    /// A pending future that will resolve `r` against a chunk source.
    pub fn from_ref(r: Ref) -> Self {
        Self {
            r,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// The content hash this future resolves to.
    pub fn reference(&self) -> Ref {
        self.r
    }

    /// Whether the blob has already been resolved.
    pub fn is_resolved(&self) -> bool {
        self.cell.initialized()
    }

    /// Resolve to the blob, fetching and decoding through `source` on first
    /// use and memoizing the result.
    ///
    /// A ref held by a future is reachable from some tree, so the chunk
    /// being absent is [`BlobError::MissingChunk`], not a soft miss.
    pub async fn deref(&self, source: &dyn ChunkSource) -> Result<Arc<Blob>, BlobError> {
        let blob = self
            .cell
            .get_or_try_init(|| async {
                let bytes = source
                    .get(self.r)
                    .await?
                    .ok_or(BlobError::MissingChunk(self.r))?;
                Ok::<_, BlobError>(Arc::new(Blob::decode(bytes)?))
            })
            .await?;
        Ok(blob.clone())
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("ref", &self.r)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
