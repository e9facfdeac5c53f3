use std::collections::VecDeque;

use crate::models::records::SendQueueStatistics;

/// Bounded queue of outbound talkback buffers for one device.
///
/// Kept for diagnostics and retry visibility; the sink manager owns one per
/// device behind its state mutex.
///
/// Overflow behavior: drops the oldest buffers.
#[derive(Debug)]
pub struct SendQueue {
    buffers: VecDeque<Vec<u8>>,
    capacity: usize,
    total_bytes: usize,
    dropped: u64,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: VecDeque::with_capacity(capacity),
            capacity,
            total_bytes: 0,
            dropped: 0,
        }
    }

    /// Append a buffer, evicting the oldest ones if the queue is full.
    ///
    /// A zero-capacity queue keeps nothing and counts every push as dropped.
    pub fn push(&mut self, buffer: Vec<u8>) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        while self.buffers.len() >= self.capacity {
            if let Some(old) = self.buffers.pop_front() {
                self.total_bytes -= old.len();
                self.dropped += 1;
            }
        }
        self.total_bytes += buffer.len();
        self.buffers.push_back(buffer);
    }

    /// Copies of the queued buffers, oldest first.
    pub fn snapshot(&self) -> Vec<Vec<u8>> {
        self.buffers.iter().cloned().collect()
    }

    /// Number of buffers currently queued.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Queued count and bytes, plus evictions since creation.
    pub fn statistics(&self) -> SendQueueStatistics {
        SendQueueStatistics {
            queued: self.buffers.len(),
            total_bytes: self.total_bytes,
            dropped: self.dropped,
        }
    }

    /// Empty the queue. The eviction count is kept.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.total_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_tracks_bytes() {
        let mut queue = SendQueue::new(4);
        queue.push(vec![1, 2, 3]);
        queue.push(vec![4]);

        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.statistics(),
            SendQueueStatistics {
                queued: 2,
                total_bytes: 4,
                dropped: 0,
            }
        );
        assert_eq!(queue.snapshot(), vec![vec![1, 2, 3], vec![4]]);
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut queue = SendQueue::new(2);
        queue.push(vec![1]);
        queue.push(vec![2, 2]);
        queue.push(vec![3, 3, 3]); // evicts [1]

        let stats = queue.statistics();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.total_bytes, 5);
        assert_eq!(queue.snapshot(), vec![vec![2, 2], vec![3, 3, 3]]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut queue = SendQueue::new(0);
        queue.push(vec![1, 2]);

        assert!(queue.is_empty());
        assert_eq!(queue.statistics().dropped, 1);
    }

    #[test]
    fn clear_keeps_eviction_count() {
        let mut queue = SendQueue::new(1);
        queue.push(vec![9; 10]);
        queue.push(vec![8; 3]);
        queue.clear();

        assert!(queue.is_empty());
        assert_eq!(queue.statistics().total_bytes, 0);
        assert_eq!(queue.statistics().dropped, 1);
    }
}
