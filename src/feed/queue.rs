//! Bounded output queue that keeps the newest items.
//!
//! A consumer that falls behind loses the oldest queued items instead of
//! slowing down the lane that feeds it. Market data goes stale quickly; the
//! latest book is worth more than the backlog.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Single-consumer queue with drop-oldest-on-overflow
#[derive(Debug)]
pub struct LatestQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    capacity: usize,
    /// Items evicted to make room for newer ones
    dropped: AtomicU64,
}

impl<T> LatestQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an item, evicting the oldest one if the queue is full.
    ///
    /// Returns `false` if the queue is closed and the item was discarded.
    pub fn push(&self, item: T) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            if state.items.len() >= self.capacity {
                state.items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            state.items.push_back(item);
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            // Register before checking, so a close in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take the next item without waiting
    pub fn try_recv(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Close the queue; pending items can still be received.
    ///
    /// Every handle waiting in [`recv`](Self::recv) wakes up.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Whether the queue was closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of items evicted so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether no item is queued
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Maximum number of queued items
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let queue = LatestQueue::new(3);
        for i in 0..5 {
            assert!(queue.push(i));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.try_recv(), Some(2));
        assert_eq!(queue.try_recv(), Some(3));
        assert_eq!(queue.try_recv(), Some(4));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let queue = LatestQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.try_recv(), Some("b"));
    }

    #[test]
    fn test_closed_queue_rejects_pushes() {
        let queue = LatestQueue::new(2);
        queue.push(1);
        queue.close();

        assert!(!queue.push(2));
        assert!(queue.is_closed());
        assert_eq!(queue.try_recv(), Some(1));
    }

    #[tokio::test]
    async fn test_recv_waits_for_push() {
        let queue = Arc::new(LatestQueue::new(4));
        let producer = Arc::clone(&queue);

        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            producer.push(7u32);
        });

        assert_eq!(queue.recv().await, Some(7));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_ends_after_close() {
        let queue = LatestQueue::new(4);
        queue.push(1u8);
        queue.close();

        assert_eq!(queue.recv().await, Some(1));
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_every_waiter() {
        let queue = Arc::new(LatestQueue::<u8>::new(4));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.recv().await })
            })
            .collect();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.close();

        for waiter in waiters {
            let received = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
                .await
                .expect("waiter still blocked after close")
                .unwrap();
            assert_eq!(received, None);
        }
    }
}
