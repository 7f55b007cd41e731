//! Blob trees for silt.
//!
//! A blob is an immutable logical byte sequence stored as a tree of
//! content-addressed chunks: [`BlobLeaf`] nodes hold the bytes,
//! [`CompoundBlob`] nodes hold ordered child references with cumulative
//! offsets. [`BlobReader`] streams a tree back as an ordinary seekable byte
//! stream, resolving children lazily and concurrently while preserving
//! byte order. [`BlobWriter`] builds a tree from a byte sequence.

mod blob;
mod error;
mod future;
mod reader;
mod write;

pub use blob::{Blob, BlobLeaf, CompoundBlob, COMPOUND_TAG, LEAF_TAG};
pub use error::BlobError;
pub use future::Future;
pub use reader::{BlobReader, ReaderOptions};
pub use write::BlobWriter;
