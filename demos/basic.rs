use compute_cache::{ComputeCache, Expiration};
use simple_logger::SimpleLogger;

use std::time::Duration;

#[tokio::main]
async fn main() {
    // enable logs for example purposes
    SimpleLogger::new().init().unwrap();

    // create our new cache
    let cache: ComputeCache<u64, u64> = ComputeCache::new();

    // insert 100K entries
    for i in 0..100_000u64 {
        cache.put(i, i, Expiration::of_life(Duration::from_millis(i))).await.unwrap();
    }

    // spawn a monitor using Redis config; 20 keys every 100ms
    cache.store().monitor(20, 0.25, Duration::from_millis(100)).await;
}
