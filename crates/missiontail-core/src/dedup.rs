//! Guard against handling the same mission end twice.
//!
//! End markers are keyed by their parsed timestamp. Keys compare by exact bit
//! pattern; log timestamps are high-resolution, so distinct events colliding
//! is not a practical concern. The set never evicts: it grows by one entry per
//! completed mission for the life of the process.

use std::collections::HashSet;

/// Set of end timestamps that were already processed.
#[derive(Debug, Default, Clone)]
pub struct DedupGuard {
    seen: HashSet<u64>,
}

impl DedupGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn already_seen(&self, end_ts: f64) -> bool {
        self.seen.contains(&key(end_ts))
    }

    /// Record `end_ts`; returns `false` if it was already present.
    pub fn mark_seen(&mut self, end_ts: f64) -> bool {
        self.seen.insert(key(end_ts))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn key(ts: f64) -> u64 {
    // -0.0 and 0.0 parse from different text but mean the same instant
    if ts == 0.0 { 0 } else { ts.to_bits() }
}
