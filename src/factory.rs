//! Clients selected and configured by logical key.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::config::{normalize_key, EnvSource, ProcessEnv, RedisConfig, RedisMode};
use crate::core::builder::ClientBuilder;
use crate::core::Client;
use crate::Result;

/// A normal-mode or cluster-mode client behind one command surface.
///
/// Cloning is cheap and shares the underlying connections.
#[derive(Debug, Clone)]
pub enum RedisClient {
    /// Single server.
    Normal(Client),
    /// Redis Cluster.
    Cluster(ClusterClient),
}

macro_rules! dispatch {
    ($self:ident, $client:ident => $call:expr) => {
        match $self {
            RedisClient::Normal($client) => $call,
            RedisClient::Cluster($client) => $call,
        }
    };
}

impl RedisClient {
    /// Connects according to `config.mode`.
    ///
    /// Cluster mode ignores `config.db`.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        match config.mode {
            RedisMode::Normal => {
                let mut builder = ClientBuilder::new()
                    .address(config.address())
                    .response_timeout(config.timeout);
                if let Some(password) = &config.password {
                    builder = builder.password(password.clone());
                }
                if let Some(timeout) = config.timeout {
                    builder = builder.connection_timeout(timeout);
                }
                Ok(Self::Normal(builder.build().await?))
            }
            RedisMode::Cluster => {
                if config.db != 0 {
                    warn!(key = %config.key, db = config.db, "database index is ignored in cluster mode");
                }
                let mut builder = ClusterClient::builder()
                    .startup_nodes(config.startup_nodes.iter().map(ToString::to_string))
                    .readonly(config.readonly)
                    .response_timeout(config.timeout);
                if let Some(password) = &config.password {
                    builder = builder.password(password.clone());
                }
                if let Some(timeout) = config.timeout {
                    builder = builder.connection_timeout(timeout);
                }
                Ok(Self::Cluster(builder.build().await?))
            }
        }
    }

    /// Which kind of deployment this client talks to.
    pub fn mode(&self) -> RedisMode {
        match self {
            Self::Normal(_) => RedisMode::Normal,
            Self::Cluster(_) => RedisMode::Cluster,
        }
    }

    /// PINGs the server, or every master of a cluster.
    pub async fn ping(&self) -> Result<Bytes> {
        dispatch!(self, c => c.ping().await)
    }

    /// Gets the value of `key`, `None` if it does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        dispatch!(self, c => c.get(key).await)
    }

    /// Sets the string value of a key.
    pub async fn set(&self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        dispatch!(self, c => c.set(key, value).await)
    }

    /// Sets the value of a key with an expiration time.
    pub async fn set_with_expiry(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        expiry: Duration,
    ) -> Result<()> {
        dispatch!(self, c => c.set_with_expiry(key, value, expiry).await)
    }

    /// Removes `key`, returning whether it existed.
    pub async fn del(&self, key: &str) -> Result<bool> {
        dispatch!(self, c => c.del(key).await)
    }

    /// Returns whether `key` exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        dispatch!(self, c => c.exists(key).await)
    }

    /// Sets a timeout on `key`.
    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        dispatch!(self, c => c.expire(key, seconds).await)
    }

    /// Remaining time to live of `key` in seconds.
    pub async fn ttl(&self, key: &str) -> Result<i64> {
        dispatch!(self, c => c.ttl(key).await)
    }

    /// Increments the integer at `key` and returns the new value.
    pub async fn incr(&self, key: &str) -> Result<i64> {
        dispatch!(self, c => c.incr(key).await)
    }

    /// Increments the integer at `key` by `amount`.
    pub async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        dispatch!(self, c => c.incr_by(key, amount).await)
    }

    /// Decrements the integer at `key`.
    pub async fn decr(&self, key: &str) -> Result<i64> {
        dispatch!(self, c => c.decr(key).await)
    }

    /// Decrements the integer at `key` by `amount`.
    pub async fn decr_by(&self, key: &str, amount: i64) -> Result<i64> {
        dispatch!(self, c => c.decr_by(key, amount).await)
    }

    /// Gets a hash field.
    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        dispatch!(self, c => c.hget(key, field).await)
    }

    /// Sets a hash field, returning true if the field is new.
    pub async fn hset(&self, key: &str, field: &str, value: impl Into<Bytes>) -> Result<bool> {
        dispatch!(self, c => c.hset(key, field, value).await)
    }

    /// Deletes hash fields.
    pub async fn hdel(&self, key: &str, fields: &[&str]) -> Result<i64> {
        dispatch!(self, c => c.hdel(key, fields).await)
    }

    /// Gets every field of a hash.
    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        dispatch!(self, c => c.hgetall(key).await)
    }
}

/// Hands out one shared [`RedisClient`] per logical key.
///
/// The first call for a key reads its variables and connects; later calls
/// return clones of the same client. Keys connect independently, so a
/// stalled server only holds up callers of its own key.
#[derive(Debug)]
pub struct RedisClientFactory<E = ProcessEnv> {
    env: E,
    clients: Mutex<HashMap<String, Arc<OnceCell<RedisClient>>>>,
}

impl RedisClientFactory<ProcessEnv> {
    /// A factory reading the process environment.
    pub fn new() -> Self {
        Self::with_env(ProcessEnv)
    }
}

impl Default for RedisClientFactory<ProcessEnv> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EnvSource> RedisClientFactory<E> {
    /// A factory reading variables from `env`.
    pub fn with_env(env: E) -> Self {
        Self {
            env,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Reads the settings for `key` without connecting.
    pub fn config_for_key(&self, key: &str) -> Result<RedisConfig> {
        RedisConfig::from_env(key, &self.env)
    }

    /// Returns the client for `key`, connecting on first use.
    ///
    /// Concurrent first calls for a key open a single client. Failures are
    /// not cached.
    pub async fn get_client_by_key(&self, key: &str) -> Result<RedisClient> {
        let key = normalize_key(key)?;
        let cell = self
            .clients
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone();

        if let Some(client) = cell.get() {
            debug!(%key, "reusing cached redis client");
            return Ok(client.clone());
        }

        let client = cell
            .get_or_try_init(|| async {
                let config = self.config_for_key(&key)?;
                let client = RedisClient::connect(&config).await?;
                info!(%key, mode = %config.mode, "created redis client");
                Ok::<_, crate::Error>(client)
            })
            .await?;
        Ok(client.clone())
    }

    /// Forgets the cached client for `key`; returns whether one existed.
    ///
    /// Clones already handed out keep working.
    pub async fn evict(&self, key: &str) -> bool {
        match normalize_key(key) {
            Ok(key) => self
                .clients
                .lock()
                .await
                .remove(&key)
                .is_some_and(|cell| cell.initialized()),
            Err(_) => false,
        }
    }
}

/// Returns the client for `key` from a process-wide factory over the
/// process environment.
pub async fn get_client_by_key(key: &str) -> Result<RedisClient> {
    static FACTORY: OnceLock<RedisClientFactory> = OnceLock::new();
    FACTORY
        .get_or_init(RedisClientFactory::new)
        .get_client_by_key(key)
        .await
}
