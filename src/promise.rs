//! Single-assignment, multi-waiter promise used to coalesce concurrent
//! producers on the same key.
//!
//! A [`Promise`] starts `Pending` and transitions exactly once, to one of
//! `Value`, `Cancelled`, or `Error` — see §4.4 of the design for the full
//! state diagram. Any number of tasks may call [`Promise::wait`]
//! concurrently; all of them observe the same terminal state once it is
//! set. The transition itself is guarded by a short, synchronous
//! [`std::sync::Mutex`] critical section (never held across an `.await`)
//! and broadcast via an [`event_listener::Event`], the same composition
//! `async-lock` uses internally to build its own primitives.
use std::sync::{Arc, Mutex};

use event_listener::Event;

use crate::error::ProducerError;

enum State<V> {
    Pending,
    Value(V),
    Cancelled,
    Error(ProducerError),
}

/// The terminal state a waiter observes once a [`Promise`] settles.
pub(crate) enum Outcome<V> {
    Value(V),
    Cancelled,
    Error(ProducerError),
}

struct Inner<V> {
    state: Mutex<State<V>>,
    event: Event,
}

/// A single-assignment cell with async, multi-waiter `await` semantics.
///
/// Cloning a `Promise` clones the handle, not the state — all clones
/// observe the same transition, matching the sharing a [`Arc`] would give
/// without exposing the `Arc` directly to callers.
pub(crate) struct Promise<V>(Arc<Inner<V>>);

impl<V> Clone for Promise<V> {
    fn clone(&self) -> Self {
        Promise(Arc::clone(&self.0))
    }
}

impl<V> Promise<V>
where
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Promise(Arc::new(Inner {
            state: Mutex::new(State::Pending),
            event: Event::new(),
        }))
    }

    /// Attempt the `Pending -> Value(v)` transition. Returns `true` if this
    /// call performed it; `false` if the promise was already settled by a
    /// faster sibling, a `remove`, or a prior producer failure.
    pub(crate) fn try_set_value(&self, value: V) -> bool {
        self.transition(State::Value(value))
    }

    /// Attempt the `Pending -> Cancelled` transition, used by `remove` and
    /// `clear` to release waiters without giving them a value.
    pub(crate) fn try_set_cancelled(&self) -> bool {
        self.transition(State::Cancelled)
    }

    /// Attempt the `Pending -> Error(e)` transition.
    pub(crate) fn try_set_error(&self, error: ProducerError) -> bool {
        self.transition(State::Error(error))
    }

    fn transition(&self, new: State<V>) -> bool {
        let mut guard = self.0.state.lock().unwrap();
        if matches!(*guard, State::Pending) {
            *guard = new;
            drop(guard);
            self.0.event.notify(usize::MAX);
            true
        } else {
            false
        }
    }

    /// Whether `self` and `other` are handles to the same underlying cell.
    pub(crate) fn same_cell(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether the promise is still unsettled.
    pub(crate) fn is_pending(&self) -> bool {
        matches!(*self.0.state.lock().unwrap(), State::Pending)
    }

    /// Non-blocking read of the current terminal state, if any.
    pub(crate) fn peek(&self) -> Option<Outcome<V>> {
        match &*self.0.state.lock().unwrap() {
            State::Pending => None,
            State::Value(v) => Some(Outcome::Value(v.clone())),
            State::Cancelled => Some(Outcome::Cancelled),
            State::Error(e) => Some(Outcome::Error(e.clone())),
        }
    }

    /// Wait for the promise to settle and return its terminal state.
    ///
    /// Registers a listener before re-checking state, which is what makes
    /// this race-free against a concurrent `transition`: the listener is
    /// in place before the second check, so a notification fired between
    /// the two checks is never missed.
    pub(crate) async fn wait(&self) -> Outcome<V> {
        loop {
            if let Some(outcome) = self.peek() {
                return outcome;
            }
            let listener = self.0.event.listen();
            if let Some(outcome) = self.peek() {
                return outcome;
            }
            listener.await;
        }
    }
}
