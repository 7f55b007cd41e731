//! Blob variants and their canonical chunk encoding.
//!
//! Encoded forms (all integers little-endian):
//!
//! - leaf:     `0x00 | payload bytes`
//! - compound: `0x01 | u32 child count k | k × (20-byte ref, u64 cumulative offset)`
//!
//! The tag byte is part of the hashed content, so a blob's ref is the hash
//! of its encoding and the whole tree has Merkle identity: two blobs with
//! equal refs are byte-for-byte equivalent when fully read.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use silt_types::{DIGEST_LEN, Ref};

use crate::error::BlobError;
use crate::future::Future;

/// Tag byte prefixing an encoded leaf chunk.
pub const LEAF_TAG: u8 = 0x00;

/// Tag byte prefixing an encoded compound chunk.
pub const COMPOUND_TAG: u8 = 0x01;

/// An immutable logical byte sequence.
#[derive(Debug, Clone)]
pub enum Blob {
    /// A single chunk of bytes.
    Leaf(BlobLeaf),
    /// An ordered sequence of child blobs with cumulative offsets.
    Compound(CompoundBlob),
}

impl Blob {
    /// Total logical byte length of this blob.
    pub fn len(&self) -> u64 {
        match self {
            Blob::Leaf(leaf) => leaf.len(),
            Blob::Compound(c) => c.len(),
        }
    }

    /// Whether the blob holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical chunk encoding of this blob node (children by reference).
    pub fn encode(&self) -> Bytes {
        match self {
            Blob::Leaf(leaf) => {
                let mut buf = BytesMut::with_capacity(1 + leaf.data.len());
                buf.put_u8(LEAF_TAG);
                buf.put_slice(&leaf.data);
                buf.freeze()
            }
            Blob::Compound(c) => {
                let k = c.futures.len();
                let mut buf = BytesMut::with_capacity(1 + 4 + k * (DIGEST_LEN + 8));
                buf.put_u8(COMPOUND_TAG);
                buf.put_u32_le(k as u32);
                for (future, offset) in c.futures.iter().zip(&c.offsets) {
                    buf.put_slice(&future.reference().digest());
                    buf.put_u64_le(*offset);
                }
                buf.freeze()
            }
        }
    }

    /// Decode a chunk back into a blob node, discriminated by the tag byte.
    pub fn decode(mut bytes: Bytes) -> Result<Blob, BlobError> {
        if bytes.is_empty() {
            return Err(BlobError::Decode("empty chunk".to_string()));
        }
        match bytes.get_u8() {
            LEAF_TAG => Ok(Blob::Leaf(BlobLeaf::new(bytes))),
            COMPOUND_TAG => {
                if bytes.remaining() < 4 {
                    return Err(BlobError::Decode("compound chunk too short".to_string()));
                }
                let k = bytes.get_u32_le() as usize;
                if bytes.remaining() != k * (DIGEST_LEN + 8) {
                    return Err(BlobError::Decode(format!(
                        "compound chunk claims {k} children but carries {} bytes",
                        bytes.remaining()
                    )));
                }
                let mut futures = Vec::with_capacity(k);
                let mut offsets = Vec::with_capacity(k);
                for _ in 0..k {
                    let mut digest = [0u8; DIGEST_LEN];
                    bytes.copy_to_slice(&mut digest);
                    futures.push(Future::from_ref(Ref::from(digest)));
                    offsets.push(bytes.get_u64_le());
                }
                Ok(Blob::Compound(CompoundBlob::new(futures, offsets)?))
            }
            tag => Err(BlobError::Decode(format!("unknown chunk tag {tag:#04x}"))),
        }
    }

    /// The content hash of this blob's encoding.
    pub fn compute_ref(&self) -> Ref {
        Ref::from_data(&self.encode())
    }
}

/// A blob whose payload is a contiguous byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLeaf {
    data: Bytes,
}

impl BlobLeaf {
    /// Create a leaf over the given bytes. An empty leaf is valid; it is
    /// how the empty blob is represented.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// The payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A blob composed of `k ≥ 1` ordered children.
///
/// `futures[i]` resolves to child `i`; `offsets[i]` is the cumulative byte
/// length of children `0..=i`, so `offsets[k-1]` is the total length and
/// child `i` covers the logical range `[offsets[i-1], offsets[i])`.
#[derive(Debug, Clone)]
pub struct CompoundBlob {
    futures: Vec<Future>,
    offsets: Vec<u64>,
}

impl CompoundBlob {
    /// Build a compound from parallel child and offset sequences.
    ///
    /// Offsets must be strictly increasing and start above zero: a
    /// zero-length child would be unreachable by any read and is rejected.
    pub fn new(futures: Vec<Future>, offsets: Vec<u64>) -> Result<Self, BlobError> {
        if futures.len() != offsets.len() {
            return Err(BlobError::InvalidOffsets(format!(
                "{} children but {} offsets",
                futures.len(),
                offsets.len()
            )));
        }
        if futures.is_empty() {
            return Err(BlobError::InvalidOffsets("compound with no children".to_string()));
        }
        let mut prev = 0u64;
        for (i, offset) in offsets.iter().enumerate() {
            if *offset <= prev {
                return Err(BlobError::InvalidOffsets(format!(
                    "offset {offset} at index {i} does not increase past {prev}"
                )));
            }
            prev = *offset;
        }
        Ok(Self { futures, offsets })
    }

    /// Total logical byte length.
    pub fn len(&self) -> u64 {
        *self.offsets.last().expect("compound has at least one child")
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.futures.len()
    }

    /// Child handles, in order.
    pub fn futures(&self) -> &[Future] {
        &self.futures
    }

    /// Cumulative offsets, parallel to [`futures`](Self::futures).
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Index of the child whose byte range contains absolute position
    /// `pos`: the smallest `i` with `offsets[i] > pos`. Returns
    /// `child_count()` when `pos` is at or past the end.
    pub(crate) fn child_containing(&self, pos: u64) -> usize {
        self.offsets.partition_point(|&offset| offset <= pos)
    }

    /// Absolute byte position where child `i` begins.
    pub(crate) fn child_start(&self, i: usize) -> u64 {
        if i == 0 { 0 } else { self.offsets[i - 1] }
    }
}
