use std::collections::VecDeque;

/// Fixed-capacity buffer that keeps the most recent entries.
///
/// When full, each push evicts the oldest entry. Reads go newest first,
/// which is the order a tail view renders.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Creates an empty buffer. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    /// Iterates from newest to oldest.
    pub fn newest_first(&self) -> impl Iterator<Item = &T> {
        self.buf.iter().rev()
    }

    /// Snapshot of the contents, newest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.newest_first().cloned().collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.buf.back()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
