//! Smoke tests against real servers, ignored by default.
//!
//! Single node on 6379 and a cluster on 7000-7005:
//! ```bash
//! docker run -d -p 6379:6379 redis:7
//! docker run -d -p 7000-7005:7000-7005 grokzen/redis-cluster:latest
//! cargo test --test live_redis -- --ignored
//! ```

use std::collections::HashMap;

use alauda_redis_client::{RedisClientFactory, RedisMode};

fn unique_key(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}:{nanos}")
}

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
#[ignore]
async fn test_normal_incr() {
    let factory = RedisClientFactory::with_env(env(&[
        ("REDIS_TYPE_READER", "normal"),
        ("REDIS_HOST_READER", "127.0.0.1"),
        ("REDIS_PORT_READER", "6379"),
        ("REDIS_DB_NAME_READER", "0"),
    ]));
    let client = factory.get_client_by_key("READER").await.unwrap();
    assert_eq!(client.mode(), RedisMode::Normal);

    let key = unique_key("liaojian");
    assert_eq!(client.incr(&key).await.unwrap(), 1);
    assert_eq!(client.incr(&key).await.unwrap(), 2);
    client.del(&key).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_cluster_incr_readonly() {
    let factory = RedisClientFactory::with_env(env(&[
        ("REDIS_TYPE_READER", "cluster"),
        ("REDIS_STARTUP_NODES_READER", "127.0.0.1:7000"),
        ("REDIS_READONLY_MODE_READER", "true"),
    ]));
    let client = factory.get_client_by_key("READER").await.unwrap();
    assert_eq!(client.mode(), RedisMode::Cluster);

    let key = unique_key("liaojian");
    assert_eq!(client.incr(&key).await.unwrap(), 1);
    assert_eq!(client.incr(&key).await.unwrap(), 2);
    client.del(&key).await.unwrap();
}
