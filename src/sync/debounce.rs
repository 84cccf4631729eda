//! Debounced flush scheduling
//!
//! A min-heap of `(fire_at, seq, key)` drained on each UI-loop tick. Every
//! new schedule for a key bumps its sequence number, so older heap entries
//! for that key turn stale and are discarded when popped.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use super::state::NoteKey;

#[derive(Debug, Default)]
pub struct FlushQueue {
    heap: BinaryHeap<Reverse<(Instant, u64, NoteKey)>>,
    latest: HashMap<NoteKey, u64>,
    seq: u64,
}

impl FlushQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a flush for `key` at `fire_at`, superseding any pending one
    pub fn schedule(&mut self, key: NoteKey, fire_at: Instant) {
        self.seq += 1;
        self.latest.insert(key, self.seq);
        self.heap.push(Reverse((fire_at, self.seq, key)));
    }

    /// Drop the pending flush for `key`, if any
    pub fn cancel(&mut self, key: NoteKey) {
        self.latest.remove(&key);
    }

    /// Number of keys with a pending flush
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Remove and return the keys whose latest schedule is due, earliest first
    pub fn pop_due(&mut self, now: Instant) -> Vec<NoteKey> {
        let mut due = Vec::new();
        while let Some(Reverse((fire_at, seq, key))) = self.heap.peek().copied() {
            if fire_at > now {
                break;
            }
            self.heap.pop();
            if self.latest.get(&key) == Some(&seq) {
                self.latest.remove(&key);
                due.push(key);
            }
        }
        due
    }

    /// When the UI loop should tick next
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((fire_at, seq, key))) = self.heap.peek().copied() {
            if self.latest.get(&key) == Some(&seq) {
                return Some(fire_at);
            }
            self.heap.pop();
        }
        None
    }
}
