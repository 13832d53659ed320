//! Transport-level suppression of re-delivered frames

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// Trailing window of recently seen frame fingerprints.
///
/// Only absorbs byte-identical retransmissions. Whether an asset was already
/// evaluated is decided by the ledger, not here.
#[derive(Debug)]
pub struct DedupWindow {
    window: Duration,
    capacity: usize,
    order: VecDeque<(u64, Instant)>,
    seen: HashMap<u64, Instant>,
}

impl DedupWindow {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashMap::new(),
        }
    }

    /// Returns `true` for the first delivery of `frame` inside the window
    pub fn admit(&mut self, frame: &[u8]) -> bool {
        self.admit_at(frame, Instant::now())
    }

    pub fn admit_at(&mut self, frame: &[u8], now: Instant) -> bool {
        self.evict_expired(now);

        let key = fingerprint(frame);
        if let Some(seen_at) = self.seen.get(&key) {
            if now.duration_since(*seen_at) < self.window {
                return false;
            }
        }

        self.seen.insert(key, now);
        self.order.push_back((key, now));
        while self.order.len() > self.capacity {
            if let Some((oldest, at)) = self.order.pop_front() {
                if self.seen.get(&oldest) == Some(&at) {
                    self.seen.remove(&oldest);
                }
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(&(key, at)) = self.order.front() {
            if now.duration_since(at) < self.window {
                break;
            }
            self.order.pop_front();
            if self.seen.get(&key) == Some(&at) {
                self.seen.remove(&key);
            }
        }
    }
}

fn fingerprint(frame: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    frame.hash(&mut hasher);
    hasher.finish()
}
