//! Increments a counter twice through the `READER` client.
//!
//! Run against a single server:
//! ```bash
//! REDIS_TYPE_READER=normal REDIS_HOST_READER=127.0.0.1 REDIS_PORT_READER=6379 \
//!   REDIS_DB_NAME_READER=0 cargo run --example incr
//! ```
//!
//! or against a cluster:
//! ```bash
//! REDIS_TYPE_READER=cluster REDIS_STARTUP_NODES_READER=127.0.0.1:7000 \
//!   REDIS_READONLY_MODE_READER=true cargo run --example incr
//! ```

use alauda_redis_client::{get_client_by_key, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let key = std::env::args().nth(1).unwrap_or_else(|| "liaojian".to_string());

    let client = get_client_by_key("READER").await?;
    println!("Connected in {} mode", client.mode());

    for _ in 0..2 {
        println!("INCR {} -> {}", key, client.incr(&key).await?);
    }

    Ok(())
}
