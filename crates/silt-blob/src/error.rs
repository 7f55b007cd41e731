//! Error types for the blob layer.

use silt_chunks::StoreError;
use silt_types::Ref;

/// Errors that can occur building, decoding, or reading blobs.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The underlying chunk store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A chunk referenced inside a blob tree is absent from the store.
    ///
    /// Unlike a top-level lookup, a reference reachable from a stored tree
    /// must resolve; failure here means the store is missing data it is
    /// supposed to hold.
    #[error("missing chunk {0} referenced by blob tree")]
    MissingChunk(Ref),

    /// Chunk bytes could not be decoded as a blob.
    #[error("undecodable blob chunk: {0}")]
    Decode(String),

    /// Compound offsets are not strictly increasing from a positive start.
    #[error("invalid compound offsets: {0}")]
    InvalidOffsets(String),

    /// A seek would land before the start of the blob.
    #[error("seek to negative position {0}")]
    InvalidSeek(i64),

    /// An earlier failure permanently poisoned this reader.
    #[error("reader previously failed: {0}")]
    ReaderFailed(String),
}
