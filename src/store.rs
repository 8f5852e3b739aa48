//! The `Store` contract and a concrete, in-process implementation.
//!
//! The computing coordinator ([`crate::coordinator::ComputeCache`]) treats
//! its backing store as an external collaborator: any type implementing
//! [`Store`] can sit underneath it — a concurrent map, an LRU engine, a
//! remote cache client. [`BTreeStore`] is the one shipped here, carried
//! forward from a `BTreeMap` behind an async `RwLock`, including its
//! Redis-style sampling eviction loop.
use std::cmp;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use async_io::Timer;
use async_lock::{RwLock, RwLockUpgradableReadGuard};
use async_trait::async_trait;
use futures_lite::stream::StreamExt;
use log::{debug, log_enabled, trace, Level};
use rand::Rng;

use crate::entry::Entry;
use crate::expiration::Expiration;

fn live<V>(entry: Entry<V>) -> Option<V> {
    if entry.is_expired() {
        None
    } else {
        Some(entry.into_inner())
    }
}

/// The contract a backing store must honor to sit underneath a
/// [`crate::coordinator::ComputeCache`].
///
/// Implementations must apply the given expiration at insertion, treat a
/// read past the life/idle bound as absent (`None`, never an error), and
/// be safe under concurrent access from many producers and readers at
/// once. A store may evict entries at any time for reasons outside the
/// caller's control (memory pressure, a size cap); callers already treat
/// `None` as "not present" so this is invisible to them.
#[async_trait]
pub trait Store<K, V>: Send + Sync
where
    K: Send + Sync,
    V: Send + Sync,
{
    /// Insert or replace the value stored under `key`, returning the prior
    /// unexpired value if one existed.
    async fn put(&self, key: K, value: V, expiration: Expiration) -> Option<V>;

    /// Retrieve the value stored under `key`, or `None` if absent or
    /// expired. A successful read refreshes the entry's idle-time clock.
    async fn get(&self, key: &K) -> Option<V>;

    /// Remove and return the value stored under `key`, or `None` if absent
    /// or expired.
    async fn remove(&self, key: &K) -> Option<V>;

    /// Remove every entry from the store.
    async fn clear(&self);

    /// Whether `key` currently maps to an unexpired value.
    async fn contains_key(&self, key: &K) -> bool;

    /// A snapshot of the currently unexpired keys.
    async fn keys(&self) -> Vec<K>;

    /// Atomically remove `key` if and only if its current unexpired value
    /// equals `expected`. Returns whether the removal happened.
    ///
    /// Must check and mutate under one critical section — a naive
    /// `get` followed by a separate `remove` races against a concurrent
    /// write landing between the two calls.
    async fn compare_remove(&self, key: &K, expected: &V) -> bool
    where
        V: PartialEq;

    /// Atomically replace the value under `key` with `new_value` if and
    /// only if its current unexpired value equals `expected`. Returns
    /// whether the replacement happened.
    ///
    /// Must check and mutate under one critical section, for the same
    /// reason as [`Store::compare_remove`].
    async fn compare_put(&self, key: &K, expected: &V, new_value: V, expiration: Expiration) -> bool
    where
        V: PartialEq;
}

/// Basic store backed by a `BTreeMap` behind an asynchronous lock.
///
/// Asynchronous locking (rather than a standard `std::sync::RwLock`)
/// avoids blocking an executor's event loop when a writer cannot
/// immediately gain a handle.
pub struct BTreeStore<K, V> {
    store: RwLock<BTreeMap<K, Entry<V>>>,
    label: String,
}

impl<K, V> BTreeStore<K, V>
where
    K: Ord + Clone,
{
    /// Construct a new, empty store.
    pub fn new() -> Self {
        Self {
            store: RwLock::new(BTreeMap::new()),
            label: String::new(),
        }
    }

    /// Sets the label used to prefix this store's log lines.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = format!("store({}): ", label);
        self
    }

    /// Retrieve the number of entries in the store, expired or not.
    ///
    /// Calculated by walking the full entry set; avoid in
    /// performance-sensitive code.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Whether the store currently holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// Count of entries that are expired but not yet evicted.
    pub async fn expired(&self) -> usize {
        self.store
            .read()
            .await
            .values()
            .filter(|entry| entry.is_expired())
            .count()
    }

    /// Count of entries that are not expired.
    pub async fn unexpired(&self) -> usize {
        self.store
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_expired())
            .count()
    }

    /// A `Future` that repeatedly samples the store for expired entries.
    ///
    /// Must be spawned on whatever executor the caller is using; this
    /// store does not evict proactively on its own otherwise. See
    /// [`BTreeStore::purge`] for the sampling algorithm.
    pub async fn monitor(&self, sample: usize, threshold: f64, frequency: Duration) {
        let mut interval = Timer::interval(frequency);
        loop {
            interval.next().await;
            self.purge(sample, threshold).await;
        }
    }

    /// Cleanse the store of expired entries using the sampling algorithm
    /// popularized by Redis:
    ///
    /// 1. Take a sample of `sample` keys from the store.
    /// 2. Remove any expired keys found in the sample.
    /// 3. If more than `threshold` of the sample was expired, repeat from 1.
    /// 4. Otherwise stop; the caller decides when to call again (typically
    ///    on a fixed `frequency` via [`BTreeStore::monitor`]).
    pub async fn purge(&self, sample: usize, threshold: f64) {
        if sample == 0 {
            return;
        }

        let start = Instant::now();

        let mut locked = Duration::from_nanos(0);
        let mut removed = 0;

        loop {
            let store = self.store.upgradable_read().await;

            if store.is_empty() {
                break;
            }

            let total = store.len();
            let sample = cmp::min(sample, total);
            let mut gone = 0;

            let mut keys = Vec::with_capacity(sample);
            let mut indices: BTreeSet<usize> = BTreeSet::new();

            {
                let mut rng = rand::thread_rng();
                while indices.len() < sample {
                    indices.insert(rng.gen_range(0..total));
                }
            }

            {
                let mut prev: Option<usize> = None;
                let mut iter: Box<dyn Iterator<Item = (&K, &Entry<V>)>> = Box::new(store.iter());

                for idx in indices {
                    let offset = match prev {
                        Some(p) => idx - p - 1,
                        None => idx,
                    };

                    iter = Box::new(iter.skip(offset));
                    prev = Some(idx);

                    let (key, entry) = iter.next().unwrap();

                    if !entry.is_expired() {
                        continue;
                    }

                    keys.push(key.to_owned());
                    gone += 1;
                }
            }

            {
                let acquired = Instant::now();
                let mut store = RwLockUpgradableReadGuard::upgrade(store).await;

                for key in &keys {
                    store.remove(key);
                }

                locked = locked.checked_add(acquired.elapsed()).unwrap();
            }

            if log_enabled!(Level::Trace) {
                trace!(
                    "{}removed {} / {} ({:.2}%) of the sampled keys",
                    self.label,
                    gone,
                    sample,
                    (gone as f64 / sample as f64) * 100f64,
                );
            }

            removed += gone;

            if (gone as f64) < (sample as f64 * threshold) {
                break;
            }
        }

        if log_enabled!(Level::Debug) {
            debug!(
                "{}purge loop removed {} entries in {:.0?} ({:.0?} locked)",
                self.label,
                removed,
                start.elapsed(),
                locked
            );
        }
    }
}

impl<K, V> Default for BTreeStore<K, V>
where
    K: Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Store<K, V> for BTreeStore<K, V>
where
    K: Ord + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn put(&self, key: K, value: V, expiration: Expiration) -> Option<V> {
        let entry = Entry::new(value, expiration);
        self.store
            .write()
            .await
            .insert(key, entry)
            .and_then(live)
    }

    async fn get(&self, key: &K) -> Option<V> {
        let guard = self.store.read().await;
        let entry = guard.get(key)?;
        if entry.is_expired() {
            return None;
        }
        entry.touch();
        Some(entry.value().clone())
    }

    async fn remove(&self, key: &K) -> Option<V> {
        self.store.write().await.remove(key).and_then(live)
    }

    async fn clear(&self) {
        self.store.write().await.clear()
    }

    async fn contains_key(&self, key: &K) -> bool {
        match self.store.read().await.get(key) {
            Some(entry) if !entry.is_expired() => {
                entry.touch();
                true
            }
            _ => false,
        }
    }

    async fn keys(&self) -> Vec<K> {
        self.store
            .read()
            .await
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(k, _)| k.clone())
            .collect()
    }

    async fn compare_remove(&self, key: &K, expected: &V) -> bool
    where
        V: PartialEq,
    {
        let guard = self.store.upgradable_read().await;
        let matches = matches!(guard.get(key), Some(entry) if !entry.is_expired() && entry.value() == expected);

        if matches {
            let mut guard = RwLockUpgradableReadGuard::upgrade(guard).await;
            guard.remove(key);
        }

        matches
    }

    async fn compare_put(&self, key: &K, expected: &V, new_value: V, expiration: Expiration) -> bool
    where
        V: PartialEq,
    {
        let guard = self.store.upgradable_read().await;
        let matches = matches!(guard.get(key), Some(entry) if !entry.is_expired() && entry.value() == expected);

        if matches {
            let mut guard = RwLockUpgradableReadGuard::upgrade(guard).await;
            guard.insert(key.clone(), Entry::new(new_value, expiration));
        }

        matches
    }
}
