//! Small structures based around entries in the cache.
//!
//! Each entry wraps a value together with the timestamps needed to answer
//! `is_expired` under an [`Expiration`] policy: a fixed `created_at` for
//! the life-time bound, and a mutable `last_accessed_at` for the idle-time
//! bound. To be convenient to the caller, an `Entry<V>` also dereferences
//! to `V`.
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::expiration::Expiration;

/// Represents an entry inside the cache.
///
/// `last_accessed_at` is behind a [`Mutex`] rather than a plain field so a
/// read can refresh the idle-time clock without a mutable borrow of the
/// entry — the store only needs a read lock to serve a `get` and still
/// keep the idle window accurate.
#[derive(Debug)]
pub struct Entry<V> {
    value: V,
    created_at: Instant,
    last_accessed_at: Mutex<Instant>,
    expiration: Expiration,
}

impl<V> Entry<V> {
    /// Wrap `value` in a new entry, timestamped at the current instant.
    pub fn new(value: V, expiration: Expiration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            last_accessed_at: Mutex::new(now),
            expiration,
        }
    }

    /// Retrieve the expiration policy associated with this entry.
    pub fn expiration(&self) -> &Expiration {
        &self.expiration
    }

    /// Replace the expiration policy without touching the value or
    /// timestamps.
    pub fn set_expiration(&mut self, expiration: Expiration) {
        self.expiration = expiration;
    }

    /// Retrieve whether this entry has passed its life or idle bound.
    ///
    /// `(life > 0 && now - created_at > life) || (idle > 0 && now -
    /// last_accessed_at > idle)`. An eternal entry (both bounds zero) is
    /// never expired by this check.
    pub fn is_expired(&self) -> bool {
        if self.expiration.is_eternal() {
            return false;
        }

        let now = Instant::now();

        let life = self.expiration.life();
        if !life.is_zero() && now.saturating_duration_since(self.created_at) > life {
            return true;
        }

        let idle = self.expiration.idle();
        if !idle.is_zero() {
            let last = *self.last_accessed_at.lock().unwrap();
            if now.saturating_duration_since(last) > idle {
                return true;
            }
        }

        false
    }

    /// Retrieve the time remaining before this entry's life bound is
    /// reached, or `None` if it has no life bound (including eternal
    /// entries). Does not account for the idle bound, since that depends on
    /// when the entry is next read rather than on a fixed point in time.
    pub fn remaining(&self) -> Option<Duration> {
        let life = self.expiration.life();
        if life.is_zero() {
            return None;
        }
        let elapsed = Instant::now().saturating_duration_since(self.created_at);
        Some(life.saturating_sub(elapsed))
    }

    /// Refresh the idle-time clock. Must only be called after a successful,
    /// non-expired read — refreshing on an expired read would resurrect an
    /// entry that should have been evicted.
    pub fn touch(&self) {
        *self.last_accessed_at.lock().unwrap() = Instant::now();
    }

    /// Retrieve a reference to the value in this entry.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Retrieve a mutable reference to the value in this entry.
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// Consume the entry, returning the wrapped value.
    pub fn into_inner(self) -> V {
        self.value
    }
}

impl<V> Deref for Entry<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        self.value()
    }
}

impl<V> DerefMut for Entry<V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn eternal_entry_never_expires() {
        let entry = Entry::new("v", Expiration::eternal());
        assert!(!entry.is_expired());
    }

    #[test]
    fn life_bound_expires_after_elapsed() {
        let entry = Entry::new("v", Expiration::of_life(Duration::from_millis(10)));
        assert!(!entry.is_expired());
        sleep(Duration::from_millis(30));
        assert!(entry.is_expired());
    }

    #[test]
    fn idle_bound_expires_without_touch() {
        let entry = Entry::new("v", Expiration::of_idle(Duration::from_millis(10)));
        sleep(Duration::from_millis(30));
        assert!(entry.is_expired());
    }

    #[test]
    fn touch_resets_idle_window() {
        let entry = Entry::new("v", Expiration::of_idle(Duration::from_millis(30)));
        sleep(Duration::from_millis(15));
        entry.touch();
        sleep(Duration::from_millis(15));
        assert!(!entry.is_expired());
    }

    #[test]
    fn remaining_counts_down_to_the_life_bound() {
        let entry = Entry::new("v", Expiration::of_life(Duration::from_millis(100)));
        let left = entry.remaining().unwrap();
        assert!(left <= Duration::from_millis(100));
        sleep(Duration::from_millis(30));
        assert!(entry.remaining().unwrap() < left);
    }

    #[test]
    fn remaining_is_none_without_a_life_bound() {
        assert!(Entry::new("v", Expiration::eternal()).remaining().is_none());
        assert!(Entry::new("v", Expiration::of_idle(Duration::from_millis(10)))
            .remaining()
            .is_none());
    }

    #[test]
    fn deref_reaches_value() {
        let entry = Entry::new(vec![1, 2, 3], Expiration::eternal());
        assert_eq!(entry.len(), 3);
    }
}
