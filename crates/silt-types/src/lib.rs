//! Content hash references for the silt chunk store.
//!
//! A [`Ref`] is the 20-byte SHA-1 digest that identifies an immutable chunk
//! of bytes. [`RefHasher`] computes a `Ref` incrementally while a chunk is
//! being written.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Width of a chunk digest in bytes.
pub const DIGEST_LEN: usize = 20;

/// Printable prefix of a formatted [`Ref`].
const REF_PREFIX: &str = "sha1";

/// Errors from parsing a printable ref string.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RefParseError {
    /// The string does not start with `sha1-`.
    #[error("ref must start with \"{REF_PREFIX}-\": {0:?}")]
    MissingPrefix(String),

    /// The hex part is not exactly 40 characters.
    #[error("ref digest must be {expected} hex chars, got {0}", expected = DIGEST_LEN * 2)]
    BadLength(usize),

    /// A character in the digest is not a hex digit.
    #[error("invalid hex digit {0:?} in ref digest")]
    BadHexDigit(char),
}

/// Content-addressed identifier for a chunk: `sha1(chunk_bytes)`.
///
/// The all-zero ref is reserved to mean "no chunk"; it is what an empty
/// store reports as its root.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Ref([u8; DIGEST_LEN]);

impl Ref {
    /// Create a ref by hashing arbitrary data in one shot.
    pub fn from_data(data: &[u8]) -> Self {
        let mut hasher = RefHasher::new();
        hasher.update(data);
        hasher.finish()
    }

    /// The all-zero ref denoting "no chunk yet".
    pub fn zero() -> Self {
        Self([0u8; DIGEST_LEN])
    }

    /// Whether this is the all-zero ref.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    /// Return the raw digest bytes.
    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        self.0
    }

    /// Parse a printable ref of the form `sha1-<40 hex chars>`.
    pub fn parse(s: &str) -> Result<Self, RefParseError> {
        let hex = s
            .strip_prefix(REF_PREFIX)
            .and_then(|rest| rest.strip_prefix('-'))
            .ok_or_else(|| RefParseError::MissingPrefix(s.to_string()))?;

        if hex.len() != DIGEST_LEN * 2 {
            return Err(RefParseError::BadLength(hex.len()));
        }

        let mut bytes = [0u8; DIGEST_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let hi = hex_nibble(hex.as_bytes()[i * 2])?;
            let lo = hex_nibble(hex.as_bytes()[i * 2 + 1])?;
            *byte = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

impl From<[u8; DIGEST_LEN]> for Ref {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Ref {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{REF_PREFIX}-")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({self})")
    }
}

impl FromStr for Ref {
    type Err = RefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn hex_nibble(c: u8) -> Result<u8, RefParseError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(RefParseError::BadHexDigit(c as char)),
    }
}

/// Streaming hasher that yields a [`Ref`] when finished.
///
/// Used by chunk writers to compute the content hash while bytes are being
/// buffered, without a second pass.
#[derive(Clone)]
pub struct RefHasher {
    inner: Sha1,
}

impl RefHasher {
    /// Start a fresh hash.
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    /// Feed more bytes into the hash.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the content hash.
    pub fn finish(self) -> Ref {
        let digest: [u8; DIGEST_LEN] = self.inner.finalize().into();
        Ref(digest)
    }
}

impl Default for RefHasher {
    fn default() -> Self {
        Self::new()
    }
}
