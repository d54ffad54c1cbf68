//! Redis Cluster ("cluster" mode) client.
//!
//! Keys are hashed to one of 16384 slots; the slot map comes from
//! `CLUSTER SLOTS` on the seed nodes and is refreshed whenever a node
//! answers `MOVED`, `CLUSTERDOWN` or drops its connection.
//!
//! ```no_run
//! # async fn example() -> alauda_redis_client::Result<()> {
//! use alauda_redis_client::ClusterClient;
//!
//! let client = ClusterClient::builder()
//!     .startup_nodes(["127.0.0.1:7000", "127.0.0.1:7001"])
//!     .readonly(true)
//!     .build()
//!     .await?;
//! let value = client.get("key").await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod commands;
mod errors;
mod pool;
mod slot;
pub mod topology;

pub use client::{ClusterClient, ClusterClientBuilder, DEFAULT_MAX_REDIRECTS};
pub use slot::{key_slot, SLOT_COUNT};
