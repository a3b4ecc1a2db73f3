//! Mutable work list of target URLs.

use std::collections::VecDeque;

use parking_lot::RwLock;

/// Ordered queue of target URLs shared by every per-proxy worker.
///
/// Failed targets are appended at the tail, which gives retried URLs a
/// natural positional back-off behind the untried ones.
pub(crate) struct TargetQueue {
    items: RwLock<VecDeque<String>>,
}

impl TargetQueue {
    pub fn new(targets: Vec<String>) -> Self {
        Self {
            items: RwLock::new(targets.into()),
        }
    }

    /// Remove and return up to `n` targets from the front. Returns fewer
    /// (possibly none) when the queue holds fewer than `n` items.
    pub fn shift(&self, n: usize) -> Vec<String> {
        let mut items = self.items.write();
        let n = n.min(items.len());
        items.drain(..n).collect()
    }

    /// Append a target at the tail.
    pub fn push(&self, target: String) {
        self.items.write().push_back(target);
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(items: &[&str]) -> TargetQueue {
        TargetQueue::new(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn shift_on_empty_queue_returns_nothing() {
        let q = queue(&[]);
        assert!(q.shift(5).is_empty());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn shift_takes_from_the_front() {
        let q = queue(&["a", "b", "c"]);
        assert_eq!(q.shift(2), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn shift_with_exactly_n_items_empties_the_queue() {
        let q = queue(&["a", "b"]);
        assert_eq!(q.shift(2).len(), 2);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn shift_caps_at_available_items() {
        let q = queue(&["a", "b"]);
        assert_eq!(q.shift(10).len(), 2);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn push_appends_at_the_tail() {
        let q = queue(&["a"]);
        q.push("b".to_string());
        assert_eq!(q.shift(2), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn shift_then_push_matches_push_then_shift_when_enough_items() {
        let left = queue(&["a", "b", "c"]);
        let taken_left = left.shift(2);
        left.push("d".to_string());

        let right = queue(&["a", "b", "c"]);
        right.push("d".to_string());
        let taken_right = right.shift(2);

        assert_eq!(taken_left, taken_right);
        assert_eq!(left.shift(10), right.shift(10));
    }
}
