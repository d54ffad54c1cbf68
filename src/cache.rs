//! Reader/writer client pair for services that split reads from writes.

use std::fmt;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::config::{EnvSource, RedisConfig, DEFAULT_PORT};
use crate::diagnose::{Component, ComponentReport};
use crate::factory::{RedisClient, RedisClientFactory};
use crate::Result;

const COMPONENT_NAME: &str = "redis";
const SUGGESTION: &str = "Check environment variables or redis health";

/// Access to the read and write side of a cache.
pub trait Cache {
    /// Client for reads.
    fn reader(&self) -> &RedisClient;
    /// Client for writes; the reader when no writer was configured.
    fn writer(&self) -> &RedisClient;
}

/// Connection settings for one normal-mode server.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisOpts {
    /// Host; an empty write host means "write to the reader".
    pub host: String,
    /// Port.
    pub port: u16,
    /// Database index.
    pub db: u8,
    /// Password sent with `AUTH`.
    pub password: Option<String>,
}

impl Default for RedisOpts {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            db: 0,
            password: None,
        }
    }
}

impl fmt::Debug for RedisOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisOpts")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl RedisOpts {
    /// `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn to_config(&self) -> RedisConfig {
        RedisConfig {
            db: self.db,
            password: self.password.clone(),
            ..RedisConfig::normal(self.host.clone(), self.port)
        }
    }
}

/// A reader client and a writer client, possibly the same one.
#[derive(Debug, Clone)]
pub struct RedisCache {
    reader: RedisClient,
    writer: RedisClient,
}

impl RedisCache {
    /// Connects normal-mode clients.
    ///
    /// A separate writer is opened only when `write_opts.host` is not empty.
    ///
    /// # Errors
    ///
    /// Fails if either connection fails or the reader does not answer PING.
    pub async fn new(read_opts: &RedisOpts, write_opts: &RedisOpts) -> Result<Self> {
        let reader = RedisClient::connect(&read_opts.to_config()).await?;
        let writer = if write_opts.host.is_empty() {
            None
        } else {
            Some(RedisClient::connect(&write_opts.to_config()).await?)
        };
        let writer_addr = match writer {
            Some(_) => write_opts.addr(),
            None => read_opts.addr(),
        };
        debug!(reader = %read_opts.addr(), writer = %writer_addr, "redis cache clients connected");
        Self::from_clients(reader, writer).await
    }

    /// Wraps existing clients; without `writer` the reader serves writes.
    ///
    /// # Errors
    ///
    /// Fails if the reader does not answer PING.
    pub async fn from_clients(reader: RedisClient, writer: Option<RedisClient>) -> Result<Self> {
        let writer = writer.unwrap_or_else(|| reader.clone());
        reader.ping().await?;
        Ok(Self { reader, writer })
    }

    /// Builds the pair from logical keys, e.g. `("reader", Some("writer"))`.
    pub async fn from_keys<E: EnvSource>(
        factory: &RedisClientFactory<E>,
        read_key: &str,
        write_key: Option<&str>,
    ) -> Result<Self> {
        let reader = factory.get_client_by_key(read_key).await?;
        let writer = match write_key {
            Some(key) => Some(factory.get_client_by_key(key).await?),
            None => None,
        };
        info!(read_key, write_key = ?write_key, "redis cache ready");
        Self::from_clients(reader, writer).await
    }
}

impl Cache for RedisCache {
    fn reader(&self) -> &RedisClient {
        &self.reader
    }

    fn writer(&self) -> &RedisClient {
        &self.writer
    }
}

impl Component for RedisCache {
    fn diagnose(&self) -> BoxFuture<'_, ComponentReport> {
        Box::pin(async move {
            let mut report = ComponentReport::new(COMPONENT_NAME);

            let start = Instant::now();
            let result = self.reader.ping().await;
            report.add_latency(start);
            report.check(&result, "Redis reader ping failed", SUGGESTION);

            let start = Instant::now();
            let result = self.writer.ping().await;
            report.add_latency(start);
            report.check(&result, "Redis writer ping failed", SUGGESTION);

            report
        })
    }
}
