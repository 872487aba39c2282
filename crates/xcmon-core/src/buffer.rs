//! Bounded FIFO buffer for retained log windows

use std::collections::VecDeque;

/// A fixed-capacity circular buffer that evicts the oldest entry when full.
///
/// Used as the retained window behind each monitor session: the reader task
/// is the sole writer, queries copy slices out. Eviction only affects this
/// buffer, never the live subscriber stream.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a value, evicting the oldest if at capacity.
    pub fn push(&mut self, value: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    /// Number of items currently stored.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Maximum capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over items from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    /// Get the most recently pushed item.
    pub fn latest(&self) -> Option<&T> {
        self.buf.back()
    }

    /// Get the oldest item.
    pub fn oldest(&self) -> Option<&T> {
        self.buf.front()
    }

    /// Clear all items.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out up to `count` of the newest entries matching `filter`,
    /// preserving oldest-to-newest order.
    pub fn newest_matching<F>(&self, count: usize, filter: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let mut out: Vec<T> = self
            .buf
            .iter()
            .rev()
            .filter(|item| filter(item))
            .take(count)
            .cloned()
            .collect();
        out.reverse();
        out
    }
}
