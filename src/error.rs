//! Error taxonomy for the computing cache.
//!
//! Most of the "null/negative argument" boundary checks named in the
//! original design are unreachable in this port: a Rust key, producer, or
//! [`crate::expiration::Expiration`] is never null, and a [`std::time::Duration`]
//! cannot be negative. [`ComputeError::InvalidArgument`] is kept in the
//! taxonomy so a [`crate::store::Store`] implementation — or a future
//! validation — has somewhere to report it, but the coordinator itself
//! never constructs it today.
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A producer's failure, preserved verbatim so it can be cloned out to
/// every waiter on the same key.
///
/// Wraps the boxed cause in an `Arc` rather than exposing it directly so
/// that [`ComputeError`] stays `Clone`, which it must be: the same failure
/// is delivered to the producer's own caller and to every concurrent
/// reader blocked in [`crate::coordinator::ComputeCache::get`].
#[derive(Debug, Clone)]
pub struct ProducerError(Arc<dyn std::error::Error + Send + Sync>);

impl ProducerError {
    pub(crate) fn new<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(cause))
    }

    /// The original cause raised by the producer.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync) {
        self.0.as_ref()
    }
}

impl fmt::Display for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ProducerError {}

/// Errors surfaced by the computing cache's public operations.
#[derive(Debug, Clone, Error)]
pub enum ComputeError {
    /// A boundary check failed before any side effect occurred (no promise
    /// was registered). See the module docs for why this rarely fires in
    /// the Rust port.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The producer raised while computing a value. The Store was not
    /// written. Delivered identically to the invoking caller and to any
    /// concurrent reader that was waiting on the same key.
    #[error("producer failed: {0}")]
    ProducerFailure(ProducerError),
}

impl ComputeError {
    pub(crate) fn producer_failed<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ComputeError::ProducerFailure(ProducerError::new(cause))
    }
}

/// Shorthand for the `Result` type returned by the coordinator's public
/// operations.
pub type ComputeResult<T> = Result<T, ComputeError>;
