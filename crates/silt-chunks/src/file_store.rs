//! Disk-backed chunk store.
//!
//! Layout in the store directory:
//!
//! - `chunks` — append-only data file of records `[u64 LE length | bytes]`.
//! - `index`  — append-only log of `(20-byte digest, u64 LE offset)` records,
//!   replayed into memory at open. Offsets point at a record's length field.
//! - `root`   — text file holding one formatted ref, or nothing.
//!
//! Reads use positioned I/O (`read_exact_at`), so concurrent `get`s never
//! contend on a file cursor. Appends serialize the whole
//! check-index → append → log-index → insert critical section under one
//! lock, which keeps recorded offsets consistent with file contents and
//! collapses concurrent writes of identical content into a single record.
//! The root file is guarded by advisory file locks so the compare-and-swap
//! is atomic across cooperating processes.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::FileExt as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use bytes::{Bytes, BytesMut};
use fs4::fs_std::FileExt;
use serde::Deserialize;
use silt_types::{DIGEST_LEN, Ref, RefHasher};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::traits::{ChunkSource, ChunkStore, ChunkWriter};

/// Bytes per index log record: digest + little-endian offset.
const INDEX_RECORD_LEN: usize = DIGEST_LEN + 8;

/// Configuration for opening a [`FileStore`].
///
/// `dir` unset means "no file store configured" — [`open`](Self::open)
/// returns `Ok(None)` so callers can fall back to another backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    /// Directory holding the store files.
    pub dir: Option<PathBuf>,
    /// Name of the file holding the root ref.
    pub root_file: String,
    /// Name of the index log file.
    pub index_file: String,
    /// Name of the chunk data file.
    pub chunks_file: String,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            dir: None,
            root_file: "root".to_string(),
            index_file: "index".to_string(),
            chunks_file: "chunks".to_string(),
        }
    }
}

impl FileStoreConfig {
    /// Open the configured store, or `None` when no directory is set.
    pub fn open(&self) -> Result<Option<FileStore>, StoreError> {
        match &self.dir {
            None => Ok(None),
            Some(dir) => {
                FileStore::open_with(dir, &self.root_file, &self.index_file, &self.chunks_file)
                    .map(Some)
            }
        }
    }
}

/// Disk-backed [`ChunkStore`].
///
/// Cheap to clone; clones share the same underlying files and index.
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<Inner>,
}

struct Inner {
    /// Data file. Accessed only through positioned reads and writes.
    chunks: File,
    /// Serializes appends: logical end of the data file + the index log handle.
    append: Mutex<AppendState>,
    /// In-memory index: content hash → offset of the record's length field.
    index: RwLock<HashMap<Ref, u64>>,
    root_path: PathBuf,
}

struct AppendState {
    /// Index log, opened in append mode.
    log: File,
    /// Offset one past the last complete record in the data file.
    end: u64,
}

impl FileStore {
    /// Open (or create) a store in `dir` with the default file names.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(dir, "root", "index", "chunks")
    }

    /// Open (or create) a store with explicit file names.
    pub fn open_with(
        dir: impl AsRef<Path>,
        root_file: &str,
        index_file: &str,
        chunks_file: &str,
    ) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let chunks = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.join(chunks_file))?;
        let data_len = chunks.metadata()?.len();

        let mut log = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(dir.join(index_file))?;
        let index = replay_index(&mut log, &chunks, data_len)?;

        debug!(
            dir = %dir.display(),
            entries = index.len(),
            data_len,
            "opened file store"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                chunks,
                append: Mutex::new(AppendState {
                    log,
                    end: data_len,
                }),
                index: RwLock::new(index),
                root_path: dir.join(root_file),
            }),
        })
    }
}

/// Rebuild the in-memory index from the log.
///
/// Records whose chunk bytes do not fully fit inside the data file are
/// skipped: an index entry must never be observable without its chunk.
/// A torn record at the tail of the log is truncated away so the next
/// append starts on a record boundary. Later records for the same digest
/// override earlier ones, so a skipped entry heals when the chunk is
/// re-put.
fn replay_index(
    log: &mut File,
    chunks: &File,
    data_len: u64,
) -> Result<HashMap<Ref, u64>, StoreError> {
    let mut buf = Vec::new();
    log.read_to_end(&mut buf)?;

    let mut index = HashMap::new();
    for record in buf.chunks_exact(INDEX_RECORD_LEN) {
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&record[..DIGEST_LEN]);
        let r = Ref::from(digest);
        let offset = u64::from_le_bytes(record[DIGEST_LEN..].try_into().expect("record length"));

        if offset + 8 > data_len {
            warn!(chunk = %r, offset, data_len, "index entry past end of data file, skipping");
            continue;
        }
        let mut len_buf = [0u8; 8];
        chunks.read_exact_at(&mut len_buf, offset)?;
        let len = u64::from_le_bytes(len_buf);
        if offset.saturating_add(8).saturating_add(len) > data_len {
            warn!(chunk = %r, offset, len, data_len, "index entry names a torn chunk, skipping");
            continue;
        }

        index.insert(r, offset);
    }

    let whole = buf.len() - buf.len() % INDEX_RECORD_LEN;
    if whole != buf.len() {
        warn!(
            torn_bytes = buf.len() - whole,
            "truncating torn record at tail of index log"
        );
        log.set_len(whole as u64)?;
    }

    Ok(index)
}

impl Inner {
    fn read_chunk(&self, r: Ref) -> Result<Option<Bytes>, StoreError> {
        let offset = {
            let index = self.index.read().expect("lock poisoned");
            match index.get(&r) {
                None => return Ok(None),
                Some(offset) => *offset,
            }
        };

        // From here on the hash is known, so any failure is corruption.
        let mut len_buf = [0u8; 8];
        self.chunks
            .read_exact_at(&mut len_buf, offset)
            .map_err(|e| StoreError::corrupt(r, format!("reading length at {offset}: {e}")))?;
        let len = u64::from_le_bytes(len_buf);

        // Reject an impossible length before trusting it for an allocation.
        let file_len = self.chunks.metadata()?.len();
        if offset.saturating_add(8).saturating_add(len) > file_len {
            return Err(StoreError::corrupt(
                r,
                format!("record at {offset} claims {len} bytes but the data file holds {file_len}"),
            ));
        }

        let mut data = vec![0u8; len as usize];
        self.chunks
            .read_exact_at(&mut data, offset + 8)
            .map_err(|e| StoreError::corrupt(r, format!("reading {len} bytes at {offset}: {e}")))?;
        Ok(Some(Bytes::from(data)))
    }

    /// The serialized critical section: check-index → append → log → insert.
    fn append_chunk(&self, r: Ref, data: &[u8]) -> Result<(), StoreError> {
        let mut append = self.append.lock().expect("lock poisoned");

        {
            let index = self.index.read().expect("lock poisoned");
            if index.contains_key(&r) {
                debug!(chunk = %r, "chunk already stored, discarding duplicate");
                return Ok(());
            }
        }

        let offset = append.end;
        let len = data.len() as u64;
        self.chunks.write_all_at(&len.to_le_bytes(), offset)?;
        self.chunks.write_all_at(data, offset + 8)?;
        append.end = offset + 8 + len;

        let actual = self.chunks.metadata()?.len();
        if actual != append.end {
            return Err(StoreError::corrupt(
                r,
                format!("data file is {actual} bytes after append, expected {}", append.end),
            ));
        }

        let mut record = [0u8; INDEX_RECORD_LEN];
        record[..DIGEST_LEN].copy_from_slice(&r.digest());
        record[DIGEST_LEN..].copy_from_slice(&offset.to_le_bytes());
        {
            use std::io::Write;
            let mut log = &append.log;
            log.write_all(&record)?;
        }

        self.index.write().expect("lock poisoned").insert(r, offset);
        debug!(chunk = %r, offset, len, "stored chunk");
        Ok(())
    }

    fn read_root(&self) -> Result<Ref, StoreError> {
        let file = match File::open(&self.root_path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Ref::zero()),
            other => other?,
        };
        file.lock_shared()?;
        let result = read_ref_from(&file);
        FileExt::unlock(&file)?;
        result
    }

    fn cas_root(&self, new: Ref, expected: Ref) -> Result<bool, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.root_path)?;
        file.lock_exclusive()?;

        let result = self.cas_root_locked(&file, new, expected);
        FileExt::unlock(&file)?;
        result
    }

    fn cas_root_locked(&self, file: &File, new: Ref, expected: Ref) -> Result<bool, StoreError> {
        let current = read_ref_from(file)?;
        if current != expected {
            debug!(%current, %expected, "root CAS missed");
            return Ok(false);
        }

        // Chunks and index must be durable before the new root names them.
        self.chunks.sync_data()?;
        self.append.lock().expect("lock poisoned").log.sync_data()?;

        file.set_len(0)?;
        file.write_all_at(new.to_string().as_bytes(), 0)?;
        file.sync_data()?;
        debug!(root = %new, "root advanced");
        Ok(true)
    }
}

/// Read a ref out of an open root file. Empty means no root yet.
fn read_ref_from(mut file: &File) -> Result<Ref, StoreError> {
    let mut s = String::new();
    file.read_to_string(&mut s)?;
    if s.is_empty() {
        return Ok(Ref::zero());
    }
    Ok(Ref::parse(s.trim_end())?)
}

#[async_trait::async_trait]
impl ChunkSource for FileStore {
    async fn get(&self, r: Ref) -> Result<Option<Bytes>, StoreError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.read_chunk(r))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

#[async_trait::async_trait]
impl ChunkStore for FileStore {
    fn put(&self) -> Box<dyn ChunkWriter> {
        Box::new(FileChunkWriter {
            inner: self.inner.clone(),
            state: WriterState::Open {
                buffer: BytesMut::new(),
                hasher: RefHasher::new(),
            },
        })
    }

    async fn root(&self) -> Result<Ref, StoreError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.read_root())
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    async fn update_root(&self, new: Ref, expected: Ref) -> Result<bool, StoreError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.cas_root(new, expected))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

enum WriterState {
    Open { buffer: BytesMut, hasher: RefHasher },
    Finalized(Ref),
}

/// Writer returned by [`FileStore::put`].
///
/// Buffers bytes and hashes them as they arrive; the append to disk happens
/// once, on [`finish`](ChunkWriter::finish).
struct FileChunkWriter {
    inner: Arc<Inner>,
    state: WriterState,
}

#[async_trait::async_trait]
impl ChunkWriter for FileChunkWriter {
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

        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.append_chunk(r, &buffer))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
        Ok(r)
    }
}
