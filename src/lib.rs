//! # alauda-redis-client
//!
//! Redis client that switches between a single Redis server ("normal" mode)
//! and a Redis Cluster at runtime. The mode and the connection parameters are
//! read from environment variables named after a logical key.
//!
//! ## Environment
//!
//! | Variable | Meaning |
//! |---|---|
//! | `REDIS_TYPE_<KEY>` | `normal` or `cluster` |
//! | `REDIS_HOST_<KEY>`, `REDIS_PORT_<KEY>`, `REDIS_DB_NAME_<KEY>` | single node parameters |
//! | `REDIS_PASSWORD_<KEY>` | password for `AUTH` |
//! | `REDIS_STARTUP_NODES_<KEY>` | cluster seed nodes, `host:port,host:port` |
//! | `REDIS_READONLY_MODE_<KEY>` | serve cluster reads from replicas |
//! | `REDIS_TIMEOUT_<KEY>` | connect and response timeout in seconds |
//!
//! ## Features
//!
//! - `json` - JSON serialization of health reports
//!
//! ## Example
//!
//! ```no_run
//! use alauda_redis_client::RedisClientFactory;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     std::env::set_var("REDIS_TYPE_READER", "normal");
//!     std::env::set_var("REDIS_HOST_READER", "127.0.0.1");
//!     std::env::set_var("REDIS_PORT_READER", "6379");
//!     std::env::set_var("REDIS_DB_NAME_READER", "0");
//!
//!     let factory = RedisClientFactory::new();
//!     let client = factory.get_client_by_key("READER").await?;
//!     println!("{}", client.incr("counter").await?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod cluster;
pub mod config;
pub mod core;
pub mod diagnose;
pub mod factory;
pub mod proto;

// Re-export high-level client types for convenience
pub use crate::cache::{Cache, RedisCache, RedisOpts};
pub use crate::cluster::{key_slot, ClusterClient, ClusterClientBuilder};
pub use crate::config::{EnvSource, NodeAddr, ProcessEnv, RedisConfig, RedisMode};
pub use crate::core::builder::ClientBuilder;
pub use crate::core::{Client, Error, Result};
pub use crate::diagnose::{Component, ComponentReport, HealthChecker, HealthReport, HealthStatus};
pub use crate::factory::{get_client_by_key, RedisClient, RedisClientFactory};
