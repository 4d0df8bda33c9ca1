//! 📬 Path Queue: the buffer between a slow bucket and an impatient consumer.
//!
//! 🧠 Knowledge graph:
//! - `VecDeque<String>` behind a `std::sync::Mutex`. The lock is held for a push or
//!   a pop, never across an `.await`. Nobody sleeps holding the keys.
//! - `Notify` wakes every parked reader when a non-empty batch lands. Readers still
//!   re-check on a poll interval, so a missed wake costs at most one tick.
//! - `pop_one` never takes the last element. With one path left it hands out a
//!   clone and keeps the original. Duplicate delivery of that path is the price of
//!   "consumption alone never empties the queue". Do not "fix" this.
//! - `is_low` is `size <= low_watermark`. The watermark is a buffer against store
//!   latency, 50000 by default.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::sync::futures::Notified;

/// 📬 Shared, ordered, append-in-bulk / pop-one-at-a-time queue of paths.
#[derive(Debug)]
pub struct PathQueue {
    paths: Mutex<VecDeque<String>>,
    low_watermark: usize,
    appended: Notify,
}

impl PathQueue {
    pub fn new(low_watermark: usize) -> Self {
        Self {
            paths: Mutex::new(VecDeque::new()),
            low_watermark,
            appended: Notify::new(),
        }
    }

    /// 📥 Append every path, in order, then wake all waiters.
    /// An empty batch is a no-op and wakes nobody.
    pub fn append(&self, paths: Vec<String>) {
        if paths.is_empty() {
            return;
        }
        self.lock().extend(paths);
        self.appended.notify_waiters();
    }

    /// 📤 Take the front path. With exactly one left, peek it instead.
    pub fn pop_one(&self) -> Option<String> {
        let mut the_paths = self.lock();
        match the_paths.len() {
            0 => None,
            1 => the_paths.front().cloned(),
            _ => the_paths.pop_front(),
        }
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// 📉 At or below the watermark: time to think about a refill.
    pub fn is_low(&self) -> bool {
        self.size() <= self.low_watermark
    }

    pub fn low_watermark(&self) -> usize {
        self.low_watermark
    }

    /// 🔔 A future that resolves on the next non-empty `append` (or [`wake_all`](Self::wake_all)).
    ///
    /// Create it, `enable()` it, THEN check the queue. Otherwise an append landing
    /// between the check and the wait is missed until the next poll tick.
    pub fn appended(&self) -> Notified<'_> {
        self.appended.notified()
    }

    /// 📢 Wake every parked reader without adding anything. Used when a refill
    /// dies, so waiters can go read the bad news.
    pub fn wake_all(&self) {
        self.appended.notify_waiters();
    }

    // -- a poisoned lock only means some other thread panicked mid-push; the deque is still a deque
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PathQueue {
    fn default() -> Self {
        Self::new(crate::app_config::DEFAULT_LOW_WATERMARK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn paths(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn the_one_where_fifo_is_fifo() {
        let the_queue = PathQueue::new(10);
        the_queue.append(paths(&["/a", "/b", "/c"]));

        assert_eq!(the_queue.pop_one().as_deref(), Some("/a"));
        assert_eq!(the_queue.pop_one().as_deref(), Some("/b"));
        assert_eq!(the_queue.size(), 1);
    }

    #[test]
    fn the_one_where_the_last_path_refuses_to_leave() {
        let the_queue = PathQueue::new(10);
        the_queue.append(paths(&["/a"]));

        assert_eq!(the_queue.pop_one().as_deref(), Some("/a"));
        assert_eq!(the_queue.pop_one().as_deref(), Some("/a"));
        assert_eq!(the_queue.size(), 1);
    }

    #[test]
    fn the_one_where_draining_stops_at_one_no_matter_how_hard_you_pull() {
        let the_queue = PathQueue::new(10);
        the_queue.append(paths(&["/a", "/b", "/c"]));

        let the_haul: Vec<String> = (0..10).filter_map(|_| the_queue.pop_one()).collect();
        assert_eq!(the_haul.len(), 10);
        assert_eq!(&the_haul[..3], &paths(&["/a", "/b", "/c"])[..]);
        assert!(the_haul[3..].iter().all(|p| p == "/c"));
        assert_eq!(the_queue.size(), 1);
    }

    #[test]
    fn the_one_where_an_empty_queue_gives_nothing() {
        let the_queue = PathQueue::new(10);
        assert_eq!(the_queue.pop_one(), None);
        assert!(the_queue.is_empty());
    }

    #[test]
    fn the_one_where_the_watermark_is_inclusive() {
        let the_queue = PathQueue::new(2);
        assert!(the_queue.is_low());
        the_queue.append(paths(&["/a", "/b"]));
        assert!(the_queue.is_low());
        the_queue.append(paths(&["/c"]));
        assert!(!the_queue.is_low());
    }

    #[test]
    fn the_one_where_the_default_watermark_is_fifty_thousand() {
        assert_eq!(PathQueue::default().low_watermark(), 50_000);
    }

    #[tokio::test]
    async fn the_one_where_append_rings_the_doorbell() {
        let the_queue = Arc::new(PathQueue::new(10));
        let the_notified = the_queue.appended();
        tokio::pin!(the_notified);
        the_notified.as_mut().enable();

        let the_appender = Arc::clone(&the_queue);
        tokio::spawn(async move {
            the_appender.append(vec!["/late".to_string()]);
        });

        tokio::time::timeout(Duration::from_secs(5), the_notified)
            .await
            .expect("💀 append should have woken us");
        assert_eq!(the_queue.pop_one().as_deref(), Some("/late"));
    }
}
