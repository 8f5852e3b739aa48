//! The computing cache coordinator: the core of this crate.
//!
//! [`ComputeCache`] layers request coalescing over any [`Store`]. When
//! many callers ask for the same key while a producer is computing it,
//! they block on that one in-flight producer instead of racing to
//! recompute it themselves — see the crate documentation for the full
//! state machine this implements.
use std::future::Future;
use std::hash::Hash;

use log::trace;

use crate::error::{ComputeError, ComputeResult};
use crate::expiration::Expiration;
use crate::promise::Outcome;
use crate::registry::Registry;
use crate::store::{BTreeStore, Store};

/// The computing cache: a [`Store`] plus request-coalescing producer
/// coordination.
///
/// `K` and `V` must be `Clone` — `V` because the same computed value is
/// handed out to every waiter on a key (and written into the `Store`),
/// `K` because the registry and the store each need their own owned copy
/// of the key.
pub struct ComputeCache<K, V, S = BTreeStore<K, V>>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: Store<K, V>,
{
    store: S,
    registry: Registry<K, V>,
    label: String,
}

impl<K, V> ComputeCache<K, V, BTreeStore<K, V>>
where
    K: Ord + Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Construct a computing cache backed by the bundled [`BTreeStore`].
    pub fn new() -> Self {
        Self::with_store(BTreeStore::new())
    }
}

impl<K, V> Default for ComputeCache<K, V, BTreeStore<K, V>>
where
    K: Ord + Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ComputeCache<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
    S: Store<K, V>,
{
    /// Construct a computing cache over a caller-supplied [`Store`].
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            registry: Registry::new(),
            label: String::new(),
        }
    }

    /// Sets the label used to prefix this cache's log lines.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = format!("compute-cache({}): ", label);
        self
    }

    /// A reference to the backing store, for callers that need direct
    /// access to store-specific diagnostics (e.g. [`BTreeStore::len`]).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert `value` under `key` with an eternal expiration.
    ///
    /// Equivalent to `compute_and_put` with a producer that trivially
    /// returns `value`; it competes for the key exactly like any other
    /// producer and wins over a still-unfinished older one (§4.4).
    pub async fn put_eternal(&self, key: K, value: V) -> ComputeResult<V> {
        self.put(key, value, Expiration::eternal()).await
    }

    /// Insert `value` under `key` with `expiration`.
    pub async fn put(&self, key: K, value: V, expiration: Expiration) -> ComputeResult<V> {
        self.compute_and_put(
            key,
            move || async move { Ok::<V, std::convert::Infallible>(value) },
            expiration,
        )
        .await
    }

    /// Compute and store a value under `key` with an eternal expiration.
    pub async fn compute_and_put_eternal<F, Fut, E>(&self, key: K, producer: F) -> ComputeResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.compute_and_put(key, producer, Expiration::eternal())
            .await
    }

    /// Compute and store a value under `key`, coalescing with any other
    /// in-flight producer for the same key.
    ///
    /// 1. Registers a promise for `key` *before* invoking `producer`, so
    ///    concurrent readers see something to wait on instead of racing
    ///    to start a duplicate computation (§4.4 step 2).
    /// 2. Runs `producer` to completion on the caller's own task —
    ///    producers are never interrupted (§5); if this future is dropped
    ///    before the producer finishes, the producer simply stops
    ///    advancing along with it, and any other waiters on the same
    ///    promise will wait until a `remove`/`clear` releases them.
    /// 3. On success, publishes the value to this promise and to every
    ///    still-pending older sibling (the "faster overtakes slower" rule,
    ///    I3), then writes the `Store` — unless this promise was already
    ///    settled by someone else (a faster sibling, or a `remove`), in
    ///    which case the `Store` is left untouched (I5).
    /// 4. Reads the promise back: a newer value set by a faster sibling is
    ///    returned to this caller too (I3); a cancellation means the
    ///    locally computed value is returned to this caller only (I4).
    pub async fn compute_and_put<F, Fut, E>(
        &self,
        key: K,
        producer: F,
        expiration: Expiration,
    ) -> ComputeResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (promise, older) = self.registry.offer(key.clone());
        trace!("{}registered producer for key", self.label);

        let outcome = producer().await;

        let result = match outcome {
            Ok(value) => {
                if promise.try_set_value(value.clone()) {
                    for sibling in &older {
                        if sibling.is_pending() {
                            sibling.try_set_value(value.clone());
                        }
                    }
                    self.store.put(key.clone(), value.clone(), expiration).await;
                }

                match promise.peek() {
                    Some(Outcome::Value(winner)) => Ok(winner),
                    Some(Outcome::Cancelled) | None => Ok(value),
                    Some(Outcome::Error(e)) => Err(ComputeError::ProducerFailure(e)),
                }
            }
            Err(cause) => {
                let error = ComputeError::producer_failed(cause);
                let producer_error = match &error {
                    ComputeError::ProducerFailure(e) => e.clone(),
                    ComputeError::InvalidArgument(_) => unreachable!(),
                };
                promise.try_set_error(producer_error);
                Err(error)
            }
        };

        self.registry.forget(&key, &promise);
        result
    }

    /// Return the existing value for `key` if present, otherwise compute
    /// and store one.
    ///
    /// Reuses [`ComputeCache::get`], so it inherits the same "prefer a
    /// stale value over blocking on a recomputation" ordering.
    pub async fn compute_and_put_if_absent<F, Fut, E>(
        &self,
        key: K,
        producer: F,
        expiration: Expiration,
    ) -> ComputeResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(value) = self.get(&key).await? {
            return Ok(value);
        }
        self.compute_and_put(key, producer, expiration).await
    }

    /// Retrieve the value stored under `key`.
    ///
    /// Checks the `Store` first: a reader prefers a stale precomputed
    /// value over blocking on an in-flight recomputation (§4.4, §9). Only
    /// when the `Store` has nothing does it fall back to waiting on the
    /// oldest in-flight producer for `key`, if one exists.
    pub async fn get(&self, key: &K) -> ComputeResult<Option<V>> {
        if let Some(value) = self.store.get(key).await {
            return Ok(Some(value));
        }

        let promise = match self.registry.peek(key) {
            Some(p) => p,
            None => return Ok(None),
        };

        match promise.wait().await {
            Outcome::Value(v) => Ok(Some(v)),
            Outcome::Cancelled => Ok(None),
            Outcome::Error(e) => Err(ComputeError::ProducerFailure(e)),
        }
    }

    /// Remove `key`, releasing any in-flight producers for it.
    ///
    /// Every promise currently queued for `key` is settled to `Cancelled`:
    /// concurrent readers waiting on it immediately see `None`, and the
    /// in-flight producers that own those promises will reach the
    /// already-settled branch of `compute_and_put` and therefore skip
    /// writing the `Store` — they still return their own locally computed
    /// value to their own caller.
    pub async fn remove(&self, key: &K) -> Option<V> {
        for promise in self.registry.drain(key) {
            promise.try_set_cancelled();
        }
        self.store.remove(key).await
    }

    /// Atomically remove `key` only if its current value equals `expected`.
    ///
    /// The check-and-remove happens under one critical section in the
    /// `Store` (see [`Store::compare_remove`]), so a concurrent write
    /// landing between the check and the removal cannot make this remove a
    /// value that no longer matches `expected`.
    pub async fn remove_if_eq(&self, key: &K, expected: &V) -> bool
    where
        V: PartialEq,
    {
        if !self.store.compare_remove(key, expected).await {
            return false;
        }
        for promise in self.registry.drain(key) {
            promise.try_set_cancelled();
        }
        true
    }

    /// Replace the value stored under `key` if and only if it is present.
    /// Returns the prior value, or `None` if `key` was absent.
    pub async fn replace(&self, key: &K, new_value: V, expiration: Expiration) -> Option<V> {
        if !self.store.contains_key(key).await {
            return None;
        }
        self.store.put(key.clone(), new_value, expiration).await
    }

    /// Replace the value stored under `key` if and only if it is present
    /// and equal to `expected`.
    ///
    /// Like [`ComputeCache::remove_if_eq`], the check-and-write happens
    /// under one critical section in the `Store` (see
    /// [`Store::compare_put`]) rather than as a separate `get` and `put`.
    pub async fn replace_if_eq(
        &self,
        key: &K,
        expected: &V,
        new_value: V,
        expiration: Expiration,
    ) -> bool
    where
        V: PartialEq,
    {
        self.store
            .compare_put(key, expected, new_value, expiration)
            .await
    }

    /// Remove every key for which `predicate` returns `true`. Returns
    /// whether any key matched.
    pub async fn remove_if<P>(&self, mut predicate: P) -> bool
    where
        P: FnMut(&K) -> bool,
    {
        let mut matched = false;
        for key in self.store.keys().await {
            if predicate(&key) {
                self.remove(&key).await;
                matched = true;
            }
        }
        matched
    }

    /// Remove every entry from the cache.
    ///
    /// Cancels every in-flight producer first, then clears the `Store`, so
    /// that no reader can observe a value written by a producer that was
    /// cancelled without knowing it.
    pub async fn clear(&self) {
        for key in self.registry.keys() {
            for promise in self.registry.drain(&key) {
                promise.try_set_cancelled();
            }
        }
        self.store.clear().await;
    }

    /// Whether `key` currently maps to an unexpired value in the `Store`.
    ///
    /// Does not consult in-flight producers; a key with a producer
    /// running but no precomputed value is reported absent here, matching
    /// the `Store` contract's `contains(k)` table entry in §6.
    pub async fn contains_key(&self, key: &K) -> bool {
        self.store.contains_key(key).await
    }

    /// A snapshot of the currently unexpired keys in the `Store`.
    pub async fn keys(&self) -> Vec<K> {
        self.store.keys().await
    }
}
