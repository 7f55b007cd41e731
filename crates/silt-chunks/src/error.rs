//! Error types for chunk storage operations.

use silt_types::{Ref, RefParseError};

/// Errors that can occur during chunk storage operations.
///
/// A `get` for an unknown hash is not an error (it returns `Ok(None)`),
/// and a compare-and-swap miss on the root is not an error (it returns
/// `Ok(false)`).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A chunk the index knows about cannot be served from the data file.
    #[error("corrupt chunk {chunk}: {reason}")]
    Corruption {
        /// The chunk that could not be served.
        chunk: Ref,
        /// What went wrong reading it.
        reason: String,
    },

    /// The root file holds something that is not a formatted ref.
    #[error("bad ref in root file: {0}")]
    Parse(#[from] RefParseError),

    /// A chunk writer was used after it was finalized.
    #[error("chunk writer misuse: {0}")]
    Misuse(&'static str),
}

impl StoreError {
    pub(crate) fn corrupt(chunk: Ref, reason: impl Into<String>) -> Self {
        Self::Corruption {
            chunk,
            reason: reason.into(),
        }
    }
}
