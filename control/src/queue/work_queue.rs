//! Deduplicating, rate-limited work queue
//!
//! Guarantees:
//! - A key is pending at most once, however often it is added
//! - A key handed out by `get` is not handed out again until `done`
//! - A key added while in flight is re-queued when `done` is called
//!
//! Workers loop on `get` / process / `done`. Failed keys go back through
//! `add_rate_limited`, which delays them according to the rate limiter.

use super::rate_limiter::RateLimiter;
use crate::apis::metrics::set_queue_depth;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

#[inline]
fn safe_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!("Mutex poisoned, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

struct QueueState<K> {
    /// Pending keys in processing order
    queue: VecDeque<K>,
    /// Keys that need processing (pending or re-added while in flight)
    dirty: HashSet<K>,
    /// Keys handed out and not yet `done`
    processing: HashSet<K>,
    shutting_down: bool,
}

/// Work queue of keys
pub struct WorkQueue<K> {
    name: String,
    state: Mutex<QueueState<K>>,
    /// Wakes workers blocked in `get`
    available: Notify,
    /// Wakes `shut_down_with_drain` when the last in-flight key is done
    drained: Notify,
    rate_limiter: Box<dyn RateLimiter<K>>,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new(name: impl Into<String>, rate_limiter: Box<dyn RateLimiter<K>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            available: Notify::new(),
            drained: Notify::new(),
            rate_limiter,
        })
    }

    /// Mark `key` as needing processing
    pub fn add(&self, key: K) {
        let mut state = safe_lock(&self.state);
        if state.shutting_down {
            return;
        }
        if !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            // Re-queued by `done`
            return;
        }
        state.queue.push_back(key);
        set_queue_depth(&self.name, state.queue.len());
        drop(state);
        self.available.notify_one();
    }

    /// Block until a key is available; `None` once shut down and empty
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.available.notified();
            {
                let mut state = safe_lock(&self.state);
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    set_queue_depth(&self.name, state.queue.len());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        // Pass the wakeup on so idle workers see remaining keys
                        self.available.notify_one();
                    }
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Release `key` after processing
    pub fn done(&self, key: &K) {
        let mut state = safe_lock(&self.state);
        state.processing.remove(key);
        let requeue = state.dirty.contains(key);
        if requeue {
            state.queue.push_back(key.clone());
            set_queue_depth(&self.name, state.queue.len());
        }
        let drained = state.shutting_down && state.processing.is_empty();
        drop(state);

        if requeue {
            self.available.notify_one();
        }
        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Add `key` once `delay` has elapsed
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }

        debug!(queue = %self.name, key = ?key, delay_ms = delay.as_millis() as u64, "Delaying key");
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Re-add `key` after the rate limiter's delay
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let delay = self.rate_limiter.when(&key);
        self.add_after(key, delay);
    }

    /// Clear the retry history of `key`
    pub fn forget(&self, key: &K) {
        self.rate_limiter.forget(key);
    }

    /// Times `key` has been re-added through `add_rate_limited`
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.rate_limiter.num_requeues(key)
    }

    /// Number of pending keys
    pub fn len(&self) -> usize {
        safe_lock(&self.state).queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutting_down(&self) -> bool {
        safe_lock(&self.state).shutting_down
    }

    /// Stop accepting keys and unblock every waiting worker
    pub fn shut_down(&self) {
        safe_lock(&self.state).shutting_down = true;
        self.available.notify_waiters();
    }

    /// `shut_down`, then wait for in-flight keys to be `done`
    pub async fn shut_down_with_drain(&self) {
        self.shut_down();
        loop {
            let drained = self.drained.notified();
            if safe_lock(&self.state).processing.is_empty() {
                return;
            }
            drained.await;
        }
    }
}
