use std::collections::VecDeque;

/// Storage reserved up front; larger windows grow as readings arrive.
const PREALLOCATE_LIMIT: usize = 1024;

/// Fixed-capacity buffer of the most recent temperatures, oldest first.
///
/// Pushing onto a full window evicts the oldest value.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    capacity: usize,
    data: VecDeque<f64>,
}

impl SlidingWindow {
    /// Capacity must be non-zero; sensor profiles are validated before a
    /// window is built, so zero is clamped to one here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            data: VecDeque::with_capacity(capacity.min(PREALLOCATE_LIMIT)),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    /// Ordered copy of the contents.
    pub fn snapshot(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn first(&self) -> Option<f64> {
        self.data.front().copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.data.back().copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_up_to_capacity() {
        let mut window = SlidingWindow::new(3);
        assert!(window.is_empty());
        window.push(1.0);
        window.push(2.0);
        assert!(!window.is_full());
        window.push(3.0);
        assert!(window.is_full());
        assert_eq!(window.snapshot(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut window = SlidingWindow::new(5);
        for v in 1..=12 {
            window.push(v as f64);
            assert!(window.len() <= 5);
        }
        assert_eq!(window.snapshot(), vec![8.0, 9.0, 10.0, 11.0, 12.0]);
        assert_eq!(window.first(), Some(8.0));
        assert_eq!(window.last(), Some(12.0));
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let mut window = SlidingWindow::new(2);
        window.push(100.0);
        let _ = window.snapshot();
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn huge_capacity_does_not_allocate_up_front() {
        let mut window = SlidingWindow::new(usize::MAX / 2);
        window.push(1.0);
        window.push(2.0);
        assert_eq!(window.capacity(), usize::MAX / 2);
        assert!(!window.is_full());
        assert_eq!(window.snapshot(), vec![1.0, 2.0]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut window = SlidingWindow::new(0);
        window.push(1.0);
        window.push(2.0);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.snapshot(), vec![2.0]);
    }
}
