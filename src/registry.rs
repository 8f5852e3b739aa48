//! Pending-producer registry: a per-key FIFO queue of in-flight
//! [`Promise`]s.
//!
//! Backed by a [`DashMap`], so each key's queue lives behind its own
//! shard lock rather than one lock for the whole registry — a reader
//! peeking at key `a`'s queue does not serialize against a producer
//! offering onto key `b`'s queue, satisfying the "reads never block
//! producers" requirement without a lock-free queue implementation.
//! A key's queue is removed from the map as soon as it empties, so the
//! registry does not retain memory for keys nobody is computing anymore.
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use crate::promise::Promise;

pub(crate) struct Registry<K, V>
where
    K: Eq + Hash,
{
    queues: DashMap<K, VecDeque<Promise<V>>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    /// Register a new promise for `key` and return it along with a
    /// snapshot, oldest first, of the siblings already queued ahead of it.
    ///
    /// Must be called before the producer is invoked, so that concurrent
    /// readers see a promise to wait on rather than racing to start a
    /// duplicate computation.
    pub(crate) fn offer(&self, key: K) -> (Promise<V>, Vec<Promise<V>>) {
        let promise = Promise::new();
        let mut queue = self.queues.entry(key).or_insert_with(VecDeque::new);
        let older: Vec<_> = queue.iter().cloned().collect();
        queue.push_back(promise.clone());
        (promise, older)
    }

    /// The oldest pending promise for `key`, if any producer is in flight.
    pub(crate) fn peek(&self, key: &K) -> Option<Promise<V>> {
        self.queues.get(key).and_then(|q| q.front().cloned())
    }

    /// Remove `promise` from `key`'s queue (a no-op if it is already gone),
    /// reclaiming the queue entirely once it is empty.
    pub(crate) fn forget(&self, key: &K, promise: &Promise<V>) {
        let emptied = match self.queues.get_mut(key) {
            Some(mut queue) => {
                if let Some(pos) = queue.iter().position(|p| p.same_cell(promise)) {
                    queue.remove(pos);
                }
                queue.is_empty()
            }
            None => return,
        };
        if emptied {
            self.queues.remove_if(key, |_, q| q.is_empty());
        }
    }

    /// Drain every promise currently queued for `key`, in FIFO order, and
    /// reclaim the queue.
    pub(crate) fn drain(&self, key: &K) -> Vec<Promise<V>> {
        match self.queues.get_mut(key) {
            Some(mut queue) => {
                let drained = queue.drain(..).collect();
                drop(queue);
                self.queues.remove_if(key, |_, q| q.is_empty());
                drained
            }
            None => Vec::new(),
        }
    }

    /// Snapshot of every key with a non-empty queue at this instant.
    pub(crate) fn keys(&self) -> Vec<K> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }
}
