//! Bounded recent-id tracker
//!
//! Suppresses reprocessing of commands already handled by this process.
//! It is an aid only: ids from before a restart are unknown to it, and the
//! ledger's claim arbitration stays the authority on ownership.

use crate::limits;
use std::collections::{HashSet, VecDeque};

/// Insertion-ordered set of handled command ids with batch eviction
#[derive(Debug)]
pub struct DedupeGuard {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
    evict_batch: usize,
}

impl Default for DedupeGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupeGuard {
    pub fn new() -> Self {
        Self::with_limits(limits::DEDUPE_CAPACITY, limits::DEDUPE_EVICT_BATCH)
    }

    /// Guard holding at most `capacity` ids, dropping the oldest
    /// `evict_batch` whenever that is exceeded
    pub fn with_limits(capacity: usize, evict_batch: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
            capacity,
            evict_batch: evict_batch.clamp(1, capacity),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record `id` as handled. Returns false if it was already recorded.
    pub fn mark(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());

        if self.order.len() > self.capacity {
            for evicted in self.order.drain(..self.evict_batch) {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
