// src/ingest/dedup.rs
use std::collections::{HashSet, VecDeque};

/// Process-local set of message ids already published.
///
/// Unbounded by default: an id marked seen is never published again for the lifetime of
/// the owning producer. With a capacity, the oldest ids are evicted first-in first-out.
#[derive(Debug, Default)]
pub struct SeenSet {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl SeenSet {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// `capacity` of 0 is treated as 1.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    /// Mark `id` as seen. Returns `true` on first observation.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string());
        if let Some(cap) = self.capacity {
            self.order.push_back(id.to_string());
            while self.order.len() > cap {
                if let Some(old) = self.order.pop_front() {
                    self.ids.remove(&old);
                }
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
