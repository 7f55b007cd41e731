//! A [`ChunkSource`] wrapper that adds configurable IO latency.
//!
//! `SlowSource` wraps any `Arc<dyn ChunkSource>` and sleeps before each
//! `get`. The RNG is seeded for deterministic, reproducible behaviour, and
//! individual refs can be given fixed delays to build adversarial
//! resolution schedules (e.g. the first child of a tree resolving last).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use silt_types::Ref;

use crate::error::StoreError;
use crate::traits::ChunkSource;

/// A [`ChunkSource`] that injects latency before every `get`.
///
/// Useful for surfacing ordering and timing bugs in the blob reader that
/// never appear against an instant in-memory store.
pub struct SlowSource {
    inner: Arc<dyn ChunkSource>,
    latency_ms: (u64, u64),
    per_ref_ms: HashMap<Ref, u64>,
    rng: Mutex<StdRng>,
}

impl SlowSource {
    /// Wrap an existing source with zero latency (pass-through) by default.
    pub fn new(inner: Arc<dyn ChunkSource>) -> Self {
        Self {
            inner,
            latency_ms: (0, 0),
            per_ref_ms: HashMap::new(),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        }
    }

    /// Set the latency range in milliseconds (uniform random per get).
    pub fn latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_ms = (min_ms, max_ms);
        self
    }

    /// Pin a fixed delay for one specific ref, overriding the range.
    pub fn delay_for(mut self, r: Ref, ms: u64) -> Self {
        self.per_ref_ms.insert(r, ms);
        self
    }

    /// Set the RNG seed for deterministic behaviour.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    async fn delay(&self, r: Ref) {
        let ms = match self.per_ref_ms.get(&r) {
            Some(ms) => *ms,
            None => {
                let (min, max) = self.latency_ms;
                if max == 0 {
                    return;
                }
                if min == max {
                    min
                } else {
                    self.rng.lock().unwrap().random_range(min..=max)
                }
            }
        };

        if ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait::async_trait]
impl ChunkSource for SlowSource {
    async fn get(&self, r: Ref) -> Result<Option<Bytes>, StoreError> {
        self.delay(r).await;
        self.inner.get(r).await
    }
}
