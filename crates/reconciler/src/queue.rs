//! Coalescing work queue with delayed and rate-limited re-adds.
//!
//! A key is in at most one of three places: queued (waiting for a worker),
//! processing (held by a worker), or neither. Adding a key that is already
//! queued is a no-op; adding a key that is being processed marks it dirty so
//! it is queued again once the worker calls [`WorkQueue::done`]. One key is
//! therefore never handed to two workers at once, and a change that arrives
//! mid-pass is never lost.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::backoff::{ExponentialBackoff, FailureRateLimiter};

struct State<K> {
    queue: VecDeque<K>,
    /// Keys that need processing: queued, or re-added while processing.
    dirty: HashSet<K>,
    processing: HashSet<K>,
    /// Earliest pending deadline of each delayed add.
    waiting: HashMap<K, Instant>,
    limiter: FailureRateLimiter<K>,
    shutting_down: bool,
}

/// Work queue shared by the event sources and the workers.
pub struct WorkQueue<K> {
    state: Mutex<State<K>>,
    notify: Notify,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Create a queue whose rate-limited adds follow `backoff`.
    #[must_use]
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                waiting: HashMap::new(),
                limiter: FailureRateLimiter::new(backoff),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Create a new queue wrapped in an Arc.
    #[must_use]
    pub fn new_arc(backoff: ExponentialBackoff) -> Arc<Self> {
        Arc::new(Self::new(backoff))
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        // State stays consistent across every critical section, so a poisoned
        // lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` as needing processing.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            trace!(key = ?key, "Key in flight, deferring until done");
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    ///
    /// The caller owns the key until it calls [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Release a key handed out by [`WorkQueue::get`], queueing it again if
    /// it was re-added meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Add `key` after `delay`. While a delayed add is pending, only an
    /// earlier deadline replaces it.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let Some(deadline) = Instant::now().checked_add(delay) else {
            debug!(key = ?key, ?delay, "Delay out of range, dropping delayed add");
            return;
        };

        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            match state.waiting.get(&key) {
                Some(existing) if *existing <= deadline => return,
                _ => {
                    state.waiting.insert(key.clone(), deadline);
                }
            }
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let due = {
                let mut state = queue.lock();
                if state.waiting.get(&key) == Some(&deadline) {
                    state.waiting.remove(&key);
                    true
                } else {
                    false
                }
            };
            if due {
                queue.add(key);
            }
        });
    }

    /// Add `key` after its backoff delay and record another failure.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let delay = self.lock().limiter.when(&key);
        debug!(key = ?key, ?delay, "Requeueing with backoff");
        self.add_after(key, delay);
    }

    /// Clear the failure history of `key`.
    pub fn forget(&self, key: &K) {
        self.lock().limiter.forget(key);
    }

    /// Failures recorded for `key` since it was last forgotten.
    #[must_use]
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.lock().limiter.num_requeues(key)
    }

    /// Number of keys waiting for a worker.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether no key is waiting for a worker.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Whether a delayed add is pending for `key`.
    #[must_use]
    pub fn is_waiting(&self, key: &K) -> bool {
        self.lock().waiting.contains_key(key)
    }

    /// Stop handing out keys and wake every blocked [`WorkQueue::get`].
    pub fn shutdown(&self) {
        {
            let mut state = self.lock();
            state.shutting_down = true;
            state.waiting.clear();
        }
        self.notify.notify_waiters();
    }

    /// Whether [`WorkQueue::shutdown`] was called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}
