//! Bounded most-recent-first record of probe results.

use std::collections::VecDeque;

/// Default number of results kept per probe kind.
pub const DEFAULT_CAPACITY: usize = 10;

/// Fixed-capacity history; newest entry first, oldest evicted on overflow.
#[derive(Debug, Clone)]
pub struct ResultHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> ResultHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend `item`, dropping the oldest entry when full.
    pub fn push(&mut self, item: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(item);
    }

    /// Owned copy of the entries, most recent first.
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> Default for ResultHistory<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
