//! Chunk storage for silt.
//!
//! This crate defines the [`ChunkSource`] / [`ChunkStore`] traits for
//! retrieving and persisting content-addressed chunks, along with:
//!
//! - [`FileStore`] — disk-backed store: append-only data file, a replayable
//!   hash→offset index log, and a root ref advanced by compare-and-swap.
//! - [`MemoryStore`] — in-memory store with the same contract.
//! - [`SlowSource`] — a latency-injecting wrapper for concurrency tests.

mod error;
mod file_store;
mod memory_store;
mod slow_source;
mod traits;

pub use error::StoreError;
pub use file_store::{FileStore, FileStoreConfig};
pub use memory_store::MemoryStore;
pub use slow_source::SlowSource;
pub use traits::{ChunkSource, ChunkStore, ChunkWriter};
