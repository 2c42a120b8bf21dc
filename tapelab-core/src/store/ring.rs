//! Bounded ring buffer: O(1) push with oldest-first eviction.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Append-only bounded buffer. Push evicts the oldest element once the
/// capacity is reached; capacity is fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundedRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedRing<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be > 0");
        Self { items: VecDeque::with_capacity(capacity), capacity }
    }

    /// Push, evicting the oldest element when full. Returns the evicted
    /// element, if any.
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

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Oldest-first contiguous view. Forces the internal deque contiguous,
    /// which is a no-op after the first call between pushes.
    pub fn make_slice(&mut self) -> &[T] {
        self.items.make_contiguous();
        self.items.as_slices().0
    }

    /// Copy the most recent `n` items, oldest-first.
    pub fn last_n(&self, n: usize) -> Vec<T>
    where
        T: Clone,
    {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_on_overflow() {
        let mut ring = BoundedRing::new(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert!(ring.is_full());
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.front(), Some(&2));
        assert_eq!(ring.back(), Some(&4));
    }

    #[test]
    fn slice_is_oldest_first() {
        let mut ring = BoundedRing::new(3);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.make_slice(), &[2, 3, 4]);
    }

    #[test]
    fn last_n_clamps() {
        let mut ring = BoundedRing::new(4);
        for i in 0..4 {
            ring.push(i);
        }
        assert_eq!(ring.last_n(2), vec![2, 3]);
        assert_eq!(ring.last_n(10), vec![0, 1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "ring capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = BoundedRing::<i32>::new(0);
    }
}
