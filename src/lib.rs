//! An in-process, keyed cache with request-coalescing computation and
//! key expirations.
//!
//! The core idea: when many concurrent callers ask for the same
//! uncached key, only one of them actually runs the producer. The rest
//! block on that single in-flight computation instead of racing to
//! duplicate it — see [`ComputeCache::compute_and_put`] and
//! [`ComputeCache::get`] for the exact rules, including what happens
//! when a newer request for the same key finishes before an older one.
//!
//! ```no_run
//! use compute_cache::{ComputeCache, Expiration};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cache: ComputeCache<&str, u64> = ComputeCache::new();
//!
//! let value = cache
//!     .compute_and_put("answer", || async { Ok::<_, std::convert::Infallible>(42) }, Expiration::of_life(Duration::from_secs(30)))
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod expiration;
pub(crate) mod promise;
pub(crate) mod registry;
pub mod store;

// lifted types to the top level
pub use crate::coordinator::ComputeCache;
pub use crate::entry::Entry;
pub use crate::error::{ComputeError, ComputeResult, ProducerError};
pub use crate::expiration::{Expiration, ExpirationBuilder};
pub use crate::store::{BTreeStore, Store};
