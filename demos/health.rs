//! Prints a JSON health report for a reader/writer cache.
//!
//! Run with:
//! ```bash
//! REDIS_HOST_CACHE=127.0.0.1 cargo run --example health --features json
//! ```

use alauda_redis_client::{HealthChecker, RedisCache, RedisClientFactory, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let factory = RedisClientFactory::new();
    let cache = RedisCache::from_keys(&factory, "CACHE", None).await?;

    let mut checker = HealthChecker::new();
    checker.add(cache);
    let report = checker.check().await;

    match report.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to encode report: {e}"),
    }
    Ok(())
}
