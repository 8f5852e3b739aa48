//! Concurrency scenarios for the computing coordinator: producer
//! coalescing, overtaking, racing removes, and failure propagation.
use compute_cache::{ComputeCache, ComputeError, Expiration};

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

fn cache() -> Arc<ComputeCache<&'static str, &'static str>> {
    Arc::new(ComputeCache::new())
}

/// Scenario 1: a single producer blocks two concurrent readers, all three
/// observing the same value.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_producer_blocks_readers() {
    let cache = cache();

    let producer = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .compute_and_put(
                    "x",
                    || async {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        Ok::<_, std::convert::Infallible>("v")
                    },
                    Expiration::eternal(),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;

    let (r1, r2) = tokio::join!(cache.get(&"x"), cache.get(&"x"));

    assert_eq!(r1.unwrap(), Some("v"));
    assert_eq!(r2.unwrap(), Some("v"));
    assert_eq!(producer.await.unwrap().unwrap(), "v");
}

/// Scenario 2: a later, faster producer overtakes an older, slower one —
/// both producer calls and a concurrent reader observe the newer value,
/// and the store ends up holding it too.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn faster_overtakes_slower() {
    let cache = cache();

    let slow = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .compute_and_put(
                    "x",
                    || async {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        Ok::<_, std::convert::Infallible>("old")
                    },
                    Expiration::eternal(),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;

    let fast = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .compute_and_put(
                    "x",
                    || async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, std::convert::Infallible>("new")
                    },
                    Expiration::eternal(),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(140)).await;
    let mid_read = cache.get(&"x").await.unwrap();

    assert_eq!(slow.await.unwrap().unwrap(), "new");
    assert_eq!(fast.await.unwrap().unwrap(), "new");
    assert_eq!(mid_read, Some("new"));
    assert_eq!(cache.get(&"x").await.unwrap(), Some("new"));
}

/// Scenario 3: a concurrent read and remove during a running producer both
/// observe `None`, while the producer's own caller still gets its computed
/// value — but the store ends up empty.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn read_and_remove_during_compute() {
    let cache = cache();

    let producer = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .compute_and_put(
                    "x",
                    || async {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        Ok::<_, std::convert::Infallible>("v")
                    },
                    Expiration::eternal(),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;

    let (read, removed) = tokio::join!(cache.get(&"x"), cache.remove(&"x"));

    assert_eq!(read.unwrap(), None);
    assert_eq!(removed, None);
    assert_eq!(producer.await.unwrap().unwrap(), "v");
    assert_eq!(cache.get(&"x").await.unwrap(), None);
}

/// P7: `clear()` cancels every in-flight producer the same way `remove()`
/// cancels the one for its own key (scenario 3 above) — a concurrent read
/// observes `None`, the producer's own caller still gets its computed
/// value, and the store ends up empty for every key `clear()` saw.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clear_during_compute() {
    let cache = cache();
    cache.put_eternal("y", "precomputed").await.unwrap();

    let producer = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .compute_and_put(
                    "x",
                    || async {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        Ok::<_, std::convert::Infallible>("v")
                    },
                    Expiration::eternal(),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;

    let (read, ()) = tokio::join!(cache.get(&"x"), cache.clear());

    assert_eq!(read.unwrap(), None);
    assert_eq!(producer.await.unwrap().unwrap(), "v");
    assert_eq!(cache.get(&"x").await.unwrap(), None);
    assert_eq!(cache.get(&"y").await.unwrap(), None);
}

/// Scenario 4: a reader prefers a precomputed value over blocking on a
/// slower recomputation in flight for the same key.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn precomputed_read_while_compute_in_progress() {
    let cache = cache();
    cache.put_eternal("x", "old").await.unwrap();

    let producer = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .compute_and_put(
                    "x",
                    || async {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        Ok::<_, std::convert::Infallible>("new")
                    },
                    Expiration::eternal(),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cache.get(&"x").await.unwrap(), Some("old"));

    producer.await.unwrap().unwrap();
    assert_eq!(cache.get(&"x").await.unwrap(), Some("new"));
}

#[derive(Debug, thiserror::Error)]
#[error("producer blew up")]
struct ProducerBoom;

/// Scenario 5/6: a producer failure is delivered to its own caller and to
/// any concurrent reader waiting on the same key, and the store is never
/// written.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn producer_failure_propagates_to_reader() {
    let cache = cache();

    let producer = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .compute_and_put(
                    "x",
                    || async {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        Err::<&str, _>(ProducerBoom)
                    },
                    Expiration::eternal(),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    let read = cache.get(&"x").await;

    assert!(matches!(
        producer.await.unwrap(),
        Err(ComputeError::ProducerFailure(_))
    ));
    assert!(matches!(read, Err(ComputeError::ProducerFailure(_))));
    assert_eq!(cache.get(&"x").await.unwrap(), None);
}

#[tokio::test]
async fn remove_is_idempotent() {
    let cache = cache();
    cache.put_eternal("x", "v").await.unwrap();

    assert_eq!(cache.remove(&"x").await, Some("v"));
    assert_eq!(cache.remove(&"x").await, None);
}

proptest! {
    /// P1: a fresh key with an eternal put always reads back the value it
    /// was given.
    #[test]
    fn put_then_get_returns_same_value(key in "[a-z]{1,8}", value in any::<u64>()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cache: ComputeCache<String, u64> = ComputeCache::new();
            cache.put(key.clone(), value, Expiration::eternal()).await.unwrap();
            prop_assert_eq!(cache.get(&key).await.unwrap(), Some(value));
            Ok(())
        })?;
    }

    /// P2: a value with a short life bound is gone once enough time has
    /// elapsed.
    #[test]
    fn put_then_get_expires_past_life_bound(key in "[a-z]{1,8}", value in any::<u64>()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cache: ComputeCache<String, u64> = ComputeCache::new();
            cache
                .put(key.clone(), value, Expiration::of_life(Duration::from_millis(5)))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(40)).await;
            prop_assert_eq!(cache.get(&key).await.unwrap(), None);
            Ok(())
        })?;
    }

    /// P8: repeated removal of the same key is idempotent — the second
    /// call always reports absence.
    #[test]
    fn repeated_remove_is_idempotent(key in "[a-z]{1,8}", value in any::<u64>()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cache: ComputeCache<String, u64> = ComputeCache::new();
            cache.put(key.clone(), value, Expiration::eternal()).await.unwrap();
            prop_assert_eq!(cache.remove(&key).await, Some(value));
            prop_assert_eq!(cache.remove(&key).await, None);
            Ok(())
        })?;
    }
}
