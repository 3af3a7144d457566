//! Fixed-capacity FIFO with drop-oldest overflow
//!
//! Used for per-recipient queues, the bus send history and the workspace
//! change log. Pushing onto a full queue evicts the oldest entry; producers
//! never wait.

use std::collections::VecDeque;

/// Ring buffer that evicts its oldest entry when full
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue; a zero capacity is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an item, returning the evicted oldest item if the queue was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove and return everything, oldest first
    pub fn drain_all(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    /// Drop everything, returning how many items were removed
    pub fn clear(&mut self) -> usize {
        let len = self.items.len();
        self.items.clear();
        len
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> BoundedQueue<T> {
    /// Copy of every item, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Copy of the newest `limit` items, oldest first
    pub fn tail(&self, limit: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(limit);
        self.items.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = BoundedQueue::new(10);
        for i in 0..5 {
            assert!(queue.push(i).is_none());
        }
        assert_eq!(queue.drain_all(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut queue = BoundedQueue::new(3);
        queue.push("a");
        queue.push("b");
        queue.push("c");

        assert_eq!(queue.push("d"), Some("a"));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.snapshot(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_tail() {
        let mut queue = BoundedQueue::new(10);
        for i in 0..6 {
            queue.push(i);
        }
        assert_eq!(queue.tail(2), vec![4, 5]);
        assert_eq!(queue.tail(100).len(), 6);
        assert!(queue.tail(0).is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut queue = BoundedQueue::new(0);
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.snapshot(), vec![2]);
        assert_eq!(queue.clear(), 1);
    }
}
