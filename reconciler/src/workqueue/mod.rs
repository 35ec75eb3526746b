//! Component F: the generic rate-limited, deduplicating, retry-with-backoff
//! workqueue (`SPEC_FULL.md` §4.7), shared by every reconciler built on top
//! of it (§4.8). Backoff reuses `reconciler_common::wait::backoff_full_jitter`,
//! the same jittered-exponential curve the sibling `storage-operator`
//! process uses for its own retries.

use reconciler_common::wait::backoff_full_jitter;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

struct Inner<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    attempts: HashMap<K, usize>,
    shutting_down: bool,
}

impl<K: Eq + Hash + Clone> Default for Inner<K> {
    fn default() -> Self {
        Inner {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            attempts: HashMap::new(),
            shutting_down: false,
        }
    }
}

/// A key that identifies one unit of work for a reconciler — e.g.
/// `{subscription, resource_group, name}` for clusters. Must be comparable
/// and hashable so duplicate enqueues collapse (§3 "Workqueue key").
pub struct WorkQueue<K: Eq + Hash + Clone + Send + 'static> {
    inner: Mutex<Inner<K>>,
    notify: Notify,
    rate_limit_base: Duration,
    rate_limit_cap: Duration,
}

impl<K: Eq + Hash + Clone + Send + 'static> WorkQueue<K> {
    pub fn new() -> Arc<Self> {
        Self::with_backoff(Duration::from_millis(5), Duration::from_secs(300))
    }

    pub fn with_backoff(base: Duration, cap: Duration) -> Arc<Self> {
        Arc::new(WorkQueue {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            rate_limit_base: base,
            rate_limit_cap: cap,
        })
    }

    /// Enqueues `key`. Duplicates while the key is dirty or being processed
    /// collapse to a single future pass.
    pub async fn add(&self, key: K) {
        let mut inner = self.inner.lock().await;
        if inner.dirty.contains(&key) {
            return;
        }
        inner.dirty.insert(key.clone());
        if inner.processing.contains(&key) {
            // Will be re-queued by `done` once the in-flight pass finishes.
            return;
        }
        inner.queue.push_back(key);
        drop(inner);
        self.notify.notify_one();
    }

    /// Blocks until a key is ready, marking it in-flight. Returns `None`
    /// once `shutdown` has been called and the queue has drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(key) = inner.queue.pop_front() {
                    inner.dirty.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
                if inner.shutting_down {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Must be called exactly once after each processing attempt. Re-queues
    /// the key if it was dirtied again while in flight.
    pub async fn done(&self, key: &K) {
        let mut inner = self.inner.lock().await;
        inner.processing.remove(key);
        if inner.dirty.contains(key) {
            inner.queue.push_back(key.clone());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Clears the rate-limit history for `key` on success.
    pub async fn forget(&self, key: &K) {
        self.inner.lock().await.attempts.remove(key);
    }

    /// Re-enqueues `key` after an exponential backoff delay, keyed by how
    /// many consecutive failures this key has seen.
    pub async fn add_rate_limited(self: &Arc<Self>, key: K) {
        let attempt = {
            let mut inner = self.inner.lock().await;
            let entry = inner.attempts.entry(key.clone()).or_insert(0);
            let attempt = *entry;
            *entry += 1;
            attempt
        };
        let delay = backoff_full_jitter(self.rate_limit_base, self.rate_limit_cap, attempt);
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.add(key).await;
        });
    }

    /// Wakes every waiter in `get` with a closed signal.
    pub async fn shutdown(&self) {
        self.inner.lock().await.shutting_down = true;
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_adds_while_dirty_collapse() {
        let q: Arc<WorkQueue<u32>> = WorkQueue::new();
        q.add(1).await;
        q.add(1).await;
        q.add(2).await;

        let first = q.get().await.unwrap();
        assert_eq!(first, 1);
        let second = q.get().await.unwrap();
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn add_during_processing_requeues_on_done() {
        let q: Arc<WorkQueue<&'static str>> = WorkQueue::new();
        q.add("a").await;
        let key = q.get().await.unwrap();
        assert_eq!(key, "a");

        // Dirtied again while in flight.
        q.add("a").await;
        q.done(&key).await;

        let requeued = q.get().await.unwrap();
        assert_eq!(requeued, "a");
    }

    #[tokio::test]
    async fn shutdown_unblocks_waiting_get() {
        let q: Arc<WorkQueue<u32>> = WorkQueue::new();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.shutdown().await;
        let result = waiter.await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn forget_clears_attempt_history() {
        let q: Arc<WorkQueue<u32>> = WorkQueue::new();
        q.add_rate_limited(1).await;
        {
            let inner = q.inner.lock().await;
            assert_eq!(inner.attempts.get(&1), Some(&1));
        }
        q.forget(&1).await;
        let inner = q.inner.lock().await;
        assert_eq!(inner.attempts.get(&1), None);
    }
}
