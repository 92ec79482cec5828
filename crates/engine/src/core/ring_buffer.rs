use std::collections::VecDeque;

/// Fixed-capacity FIFO history. Pushing onto a full buffer evicts the oldest
/// entry. Entries are never mutated after insertion.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, returning the evicted one if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Owned copy of the contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_oldest() {
        let mut buf = RingBuffer::new(3);
        assert_eq!(buf.push(1), None);
        assert_eq!(buf.push(2), None);
        assert_eq!(buf.push(3), None);
        assert_eq!(buf.push(4), Some(1));
        assert_eq!(buf.snapshot(), vec![2, 3, 4]);
        assert_eq!(buf.last(), Some(&4));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buf = RingBuffer::new(0);
        buf.push("a");
        buf.push("b");
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.snapshot(), vec!["b"]);
    }

    #[test]
    fn test_iter_is_oldest_first() {
        let mut buf = RingBuffer::new(5);
        for i in 0..7 {
            buf.push(i);
        }
        let items: Vec<i32> = buf.iter().copied().collect();
        assert_eq!(items, vec![2, 3, 4, 5, 6]);
        assert_eq!(buf.iter().rev().next(), Some(&6));
    }
}
