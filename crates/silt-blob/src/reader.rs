//! Seekable streaming reader over a blob tree.
//!
//! The reader walks the tree in depth-first, left-to-right order and
//! delivers leaf bytes as one continuous stream. To hide chunk-fetch
//! latency it runs a leaf producer concurrently with the consumer: at each
//! compound node, one ordered slot (a bounded channel) is allocated per
//! child *before* that child's resolution is launched, children resolve in
//! parallel under a semaphore, and the parent drains the slots strictly in
//! child order. Order is therefore preserved no matter how resolution
//! times interleave, and the bounded channels give backpressure.
//!
//! Cancellation is cooperative: dropping the consumer's receiver makes the
//! producer's next send fail, and the task tree unwinds with each parent
//! awaiting its children, so a closed reader leaves nothing running.

use std::io::SeekFrom;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use silt_chunks::ChunkSource;
use silt_types::Ref;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::blob::Blob;
use crate::error::BlobError;
use crate::future::Future;

/// Tuning knobs for a [`BlobReader`].
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Capacity of each leaf buffer channel.
    pub buffer: usize,
    /// Maximum number of chunk fetches in flight at once.
    pub max_concurrent_derefs: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            buffer: 4,
            max_concurrent_derefs: 8,
        }
    }
}

/// A positioned byte reader over a blob tree.
///
/// `read` returns `Ok(0)` only at end of stream; `seek` supports
/// `Start`/`Current`/`End` positioning, may land past the end (subsequent
/// reads see EOF), and cancels any prefetch in flight. After a traversal
/// failure the reader is permanently failed and every further call returns
/// [`BlobError::ReaderFailed`].
pub struct BlobReader {
    blob: Arc<Blob>,
    source: Arc<dyn ChunkSource>,
    opts: ReaderOptions,
    len: u64,
    pos: u64,
    /// Unconsumed tail of the leaf currently being read.
    current: Bytes,
    prefetch: Option<Prefetch>,
    failed: Option<String>,
}

struct Prefetch {
    rx: mpsc::Receiver<Result<Bytes, BlobError>>,
    task: JoinHandle<()>,
}

impl BlobReader {
    /// Create a reader over an in-memory blob value.
    pub fn new(blob: Blob, source: Arc<dyn ChunkSource>) -> Self {
        Self::with_options(blob, source, ReaderOptions::default())
    }

    /// Create a reader with explicit tuning options.
    pub fn with_options(blob: Blob, source: Arc<dyn ChunkSource>, opts: ReaderOptions) -> Self {
        Self::from_arc(Arc::new(blob), source, opts)
    }

    /// Resolve `r` against `source` and open a reader on the result.
    pub async fn open(source: Arc<dyn ChunkSource>, r: Ref) -> Result<Self, BlobError> {
        Self::open_with_options(source, r, ReaderOptions::default()).await
    }

    /// [`open`](Self::open) with explicit tuning options.
    pub async fn open_with_options(
        source: Arc<dyn ChunkSource>,
        r: Ref,
        opts: ReaderOptions,
    ) -> Result<Self, BlobError> {
        let blob = Future::from_ref(r).deref(source.as_ref()).await?;
        Ok(Self::from_arc(blob, source, opts))
    }

    fn from_arc(blob: Arc<Blob>, source: Arc<dyn ChunkSource>, opts: ReaderOptions) -> Self {
        let len = blob.len();
        Self {
            blob,
            source,
            opts,
            len,
            pos: 0,
            current: Bytes::new(),
            prefetch: None,
            failed: None,
        }
    }

    /// Total logical length of the blob in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the blob holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current absolute read position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read up to `buf.len()` bytes, crossing leaf boundaries to fill the
    /// buffer where more bytes are pending. Returns `Ok(0)` only at EOF.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, BlobError> {
        if let Some(msg) = &self.failed {
            return Err(BlobError::ReaderFailed(msg.clone()));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let mut filled = 0;
        while filled < buf.len() {
            if !self.current.is_empty() {
                let n = self.current.len().min(buf.len() - filled);
                buf[filled..filled + n].copy_from_slice(&self.current.split_to(n));
                self.pos += n as u64;
                filled += n;
                continue;
            }
            if self.pos >= self.len {
                break;
            }

            if self.prefetch.is_none() {
                self.start_prefetch();
            }
            let prefetch = self.prefetch.as_mut().expect("prefetch just started");
            match prefetch.rx.recv().await {
                Some(Ok(bytes)) => self.current = bytes,
                Some(Err(e)) => return self.fail(e, filled).await,
                None => {
                    // The producer finished before reaching the blob's
                    // stated length: the tree lied about its offsets.
                    let e = BlobError::Decode(
                        "leaf stream ended before reaching blob length".to_string(),
                    );
                    return self.fail(e, filled).await;
                }
            }
        }
        Ok(filled)
    }

    /// Reposition the logical cursor. Any prefetch in flight is cancelled;
    /// the next `read` resumes at the new position.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64, BlobError> {
        if let Some(msg) = &self.failed {
            return Err(BlobError::ReaderFailed(msg.clone()));
        }

        let target: i128 = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => self.len as i128 + delta as i128,
        };
        if target < 0 {
            return Err(BlobError::InvalidSeek(target as i64));
        }

        self.cancel_prefetch().await;
        self.current = Bytes::new();
        self.pos = u64::try_from(target).unwrap_or(u64::MAX);
        Ok(self.pos)
    }

    /// Read everything from the current position to EOF.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, BlobError> {
        let mut out = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Cancel any in-flight traversal and wait for every background task
    /// to terminate.
    pub async fn close(mut self) {
        self.cancel_prefetch().await;
    }

    async fn fail(&mut self, e: BlobError, filled: usize) -> Result<usize, BlobError> {
        self.failed = Some(e.to_string());
        self.cancel_prefetch().await;
        // Bytes already copied out are not unwound; the failure surfaces
        // on the next call.
        if filled > 0 { Ok(filled) } else { Err(e) }
    }

    fn start_prefetch(&mut self) {
        let (tx, rx) = mpsc::channel(self.opts.buffer.max(1));
        let sem = Arc::new(Semaphore::new(self.opts.max_concurrent_derefs.max(1)));
        let blob = self.blob.clone();
        let source = self.source.clone();
        let skip = self.pos;
        let buffer = self.opts.buffer.max(1);
        debug!(skip, len = self.len, "starting leaf producer");
        let task = tokio::spawn(async move {
            let _ = emit_leaves(blob, source, skip, tx, sem, buffer).await;
        });
        self.prefetch = Some(Prefetch { rx, task });
    }

    async fn cancel_prefetch(&mut self) {
        if let Some(prefetch) = self.prefetch.take() {
            // Dropping the receiver fails the producer's next send; the
            // task tree unwinds from there.
            drop(prefetch.rx);
            let _ = prefetch.task.await;
        }
    }
}

/// The producer stopped early: the consumer went away or an error was
/// already delivered in-band.
struct Stopped;

/// Emit the leaves of `blob` into `tx` in in-order traversal sequence,
/// skipping the first `skip` logical bytes.
///
/// The skip descends the tree by binary search, so seeking costs one
/// partition-point per level rather than a walk of the whole prefix.
fn emit_leaves(
    blob: Arc<Blob>,
    source: Arc<dyn ChunkSource>,
    skip: u64,
    tx: mpsc::Sender<Result<Bytes, BlobError>>,
    sem: Arc<Semaphore>,
    buffer: usize,
) -> Pin<Box<dyn std::future::Future<Output = Result<(), Stopped>> + Send>> {
    Box::pin(async move {
        match &*blob {
            Blob::Leaf(leaf) => {
                let start = skip.min(leaf.len()) as usize;
                let data = leaf.data().slice(start..);
                if !data.is_empty() {
                    tx.send(Ok(data)).await.map_err(|_| Stopped)?;
                }
                Ok(())
            }
            Blob::Compound(compound) => {
                let first = compound.child_containing(skip);

                // Allocate one ordered slot per child up front, then launch
                // resolutions; draining the slots in order merges the
                // children's leaf streams back into traversal order.
                let mut slots = Vec::with_capacity(compound.child_count() - first);
                for i in first..compound.child_count() {
                    let child = compound.futures()[i].clone();
                    let child_skip = if i == first {
                        skip - compound.child_start(i)
                    } else {
                        0
                    };
                    let (child_tx, child_rx) = mpsc::channel(buffer);
                    let handle = tokio::spawn(resolve_child(
                        child,
                        source.clone(),
                        child_skip,
                        child_tx,
                        sem.clone(),
                        buffer,
                    ));
                    slots.push((child_rx, handle));
                }

                let mut result = Ok(());
                for (mut child_rx, handle) in slots {
                    if result.is_ok() {
                        while let Some(item) = child_rx.recv().await {
                            let stop = item.is_err();
                            if tx.send(item).await.is_err() {
                                result = Err(Stopped);
                                break;
                            }
                            if stop {
                                // The error is in the stream; everything
                                // after it would be garbage.
                                result = Err(Stopped);
                                break;
                            }
                        }
                    }
                    // Closing the slot cancels a still-running child; wait
                    // for it so no task outlives its parent.
                    drop(child_rx);
                    let _ = handle.await;
                }
                result
            }
        }
    })
}

/// Resolve one child under the deref semaphore, then stream its leaves
/// into the child's slot.
async fn resolve_child(
    child: Future,
    source: Arc<dyn ChunkSource>,
    skip: u64,
    tx: mpsc::Sender<Result<Bytes, BlobError>>,
    sem: Arc<Semaphore>,
    buffer: usize,
) {
    let resolved = {
        let _permit = match sem.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        child.deref(source.as_ref()).await
    };
    match resolved {
        Err(e) => {
            let _ = tx.send(Err(e)).await;
        }
        Ok(blob) => {
            let _ = emit_leaves(blob, source, skip, tx, sem, buffer).await;
        }
    }
}
