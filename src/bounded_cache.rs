//! Bounded set of processed deposit ids with TTL and max-size eviction.
//!
//! Used by the listener in continuous polling mode so that deposits the feed
//! keeps returning are only routed once. Memory stays bounded under long
//! runtimes: each entry is the deposit id plus an `Instant`, so the default
//! 100k entries stay in the low tens of MB.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub const DEFAULT_SEEN_DEPOSIT_CAPACITY: usize = 100_000;
pub const DEFAULT_SEEN_DEPOSIT_TTL_SECS: u64 = 86_400; // 24 hours

/// Deposit ids already handed through the pipeline.
///
/// - **Max capacity:** when full, the oldest id is evicted on insert.
/// - **TTL:** ids older than the TTL no longer count as seen and are dropped
///   on the next insert.
#[derive(Debug)]
pub struct SeenDeposits {
    seen_at: HashMap<String, Instant>,
    order: VecDeque<String>,
    max_size: usize,
    ttl: Duration,
}

impl SeenDeposits {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            seen_at: HashMap::new(),
            order: VecDeque::new(),
            max_size: max_size.max(1),
            ttl,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen_at
            .get(id)
            .is_some_and(|t| t.elapsed() < self.ttl)
    }

    /// Mark an id as seen. Returns false if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        if self.seen_at.remove(id).is_some() {
            self.order.retain(|k| k != id);
        }

        let now = Instant::now();
        // Insertion order is time order, so expired ids sit at the front
        while let Some(front) = self.order.front() {
            let expired = self
                .seen_at
                .get(front)
                .map_or(true, |t| now.duration_since(*t) >= self.ttl);
            if !expired && self.order.len() < self.max_size {
                break;
            }
            if let Some(evicted) = self.order.pop_front() {
                self.seen_at.remove(&evicted);
            }
        }

        self.seen_at.insert(id.to_string(), now);
        self.order.push_back(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for SeenDeposits {
    fn default() -> Self {
        Self::new(
            DEFAULT_SEEN_DEPOSIT_CAPACITY,
            Duration::from_secs(DEFAULT_SEEN_DEPOSIT_TTL_SECS),
        )
    }
}
