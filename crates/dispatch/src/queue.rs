//! Per-worker backlog: one FIFO bucket per priority level plus a load counter

use std::collections::VecDeque;

use crate::priority::PriorityLevel;

/// Backlog owned by one worker slot
///
/// `load` always equals the combined length of the three buckets once a
/// method returns. The counter is kept instead of summing lengths so that
/// least-loaded selection stays a single pass over plain integers.
#[derive(Debug)]
pub(crate) struct WorkerQueue<T> {
    buckets: [VecDeque<T>; PriorityLevel::COUNT],
    load: usize,
}

impl<T> WorkerQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            buckets: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            load: 0,
        }
    }

    pub(crate) fn load(&self) -> usize {
        self.load
    }

    /// Number of tasks waiting at one level
    pub(crate) fn queued_at(&self, priority: PriorityLevel) -> usize {
        self.buckets[priority.slot()].len()
    }

    pub(crate) fn push(&mut self, task: T, priority: PriorityLevel) {
        self.buckets[priority.slot()].push_back(task);
        self.load += 1;
    }

    /// Remove the head of one bucket
    pub(crate) fn pop_at(&mut self, priority: PriorityLevel) -> Option<T> {
        let task = self.buckets[priority.slot()].pop_front()?;
        self.load -= 1;
        Some(task)
    }

    /// Remove the head of the highest non-empty bucket
    pub(crate) fn pop_next(&mut self) -> Option<(PriorityLevel, T)> {
        PriorityLevel::SCAN_ORDER
            .into_iter()
            .find_map(|priority| self.pop_at(priority).map(|task| (priority, task)))
    }

    pub(crate) fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.load = 0;
    }

    /// Whether the counter agrees with the bucket contents
    pub(crate) fn is_consistent(&self) -> bool {
        self.load == self.buckets.iter().map(VecDeque::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_queue_is_empty() {
        let queue: WorkerQueue<u32> = WorkerQueue::new();
        assert_eq!(queue.load(), 0);
        assert!(queue.is_consistent());
    }

    #[test]
    fn test_push_and_pop_track_load() {
        let mut queue = WorkerQueue::new();
        queue.push(1, PriorityLevel::Low);
        queue.push(2, PriorityLevel::High);
        queue.push(3, PriorityLevel::Mid);
        assert_eq!(queue.load(), 3);
        assert_eq!(queue.queued_at(PriorityLevel::High), 1);

        assert_eq!(queue.pop_next(), Some((PriorityLevel::High, 2)));
        assert_eq!(queue.pop_next(), Some((PriorityLevel::Mid, 3)));
        assert_eq!(queue.pop_next(), Some((PriorityLevel::Low, 1)));
        assert_eq!(queue.pop_next(), None);
        assert_eq!(queue.load(), 0);
        assert!(queue.is_consistent());
    }

    #[test]
    fn test_pop_at_empty_bucket_leaves_load() {
        let mut queue = WorkerQueue::new();
        queue.push("a", PriorityLevel::Low);
        assert_eq!(queue.pop_at(PriorityLevel::High), None);
        assert_eq!(queue.load(), 1);
    }

    #[test]
    fn test_fifo_within_bucket() {
        let mut queue = WorkerQueue::new();
        for i in 0..5 {
            queue.push(i, PriorityLevel::Mid);
        }
        let drained: Vec<_> = std::iter::from_fn(|| queue.pop_at(PriorityLevel::Mid)).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_clear_resets_load() {
        let mut queue = WorkerQueue::new();
        queue.push(1, PriorityLevel::High);
        queue.push(2, PriorityLevel::Low);
        queue.clear();
        assert_eq!(queue.load(), 0);
        assert_eq!(queue.queued_at(PriorityLevel::High), 0);
        assert!(queue.is_consistent());
    }
}
