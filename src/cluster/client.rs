use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::core::command::{self, Cmd};
use crate::core::{ConnectOptions, Error, Result};
use crate::proto::frame::Frame;

use super::commands::{asking, cluster_slots};
use super::errors::parse_redis_error;
use super::pool::ConnectionPool;
use super::slot::key_slot;
use super::topology::ClusterTopology;

/// Redirects followed before a command gives up.
pub const DEFAULT_MAX_REDIRECTS: usize = 16;

/// Pause before retrying after `CLUSTERDOWN`.
const CLUSTER_DOWN_BACKOFF: Duration = Duration::from_millis(50);

/// Where the next attempt of a command goes.
enum Redirect {
    Moved(String),
    Ask(String),
}

struct Inner {
    startup_nodes: Vec<String>,
    topology: RwLock<ClusterTopology>,
    pool: ConnectionPool,
    readonly: bool,
    max_redirects: usize,
    replica_cursor: AtomicUsize,
}

/// Redis Cluster client.
///
/// Keys are routed to the master owning their hash slot. `MOVED` and `ASK`
/// redirects are followed transparently, refreshing the slot map as needed.
/// In read-only mode every node connection sends `READONLY` and read
/// commands are spread round-robin over the slot's replicas.
///
/// Cloning is cheap; clones share topology and connections.
///
/// ```no_run
/// use alauda_redis_client::ClusterClient;
///
/// # async fn run() -> alauda_redis_client::Result<()> {
/// let client = ClusterClient::connect("127.0.0.1:7000,127.0.0.1:7001").await?;
/// client.set("key", "value").await?;
/// assert_eq!(client.incr("hits").await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClusterClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterClient")
            .field("startup_nodes", &self.inner.startup_nodes)
            .field("readonly", &self.inner.readonly)
            .field("max_redirects", &self.inner.max_redirects)
            .finish()
    }
}

/// Builder for [`ClusterClient`].
#[derive(Debug)]
pub struct ClusterClientBuilder {
    startup_nodes: Vec<String>,
    options: ConnectOptions,
    max_redirects: usize,
}

impl Default for ClusterClientBuilder {
    fn default() -> Self {
        Self {
            startup_nodes: Vec::new(),
            options: ConnectOptions::default(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl ClusterClientBuilder {
    /// Adds a seed node.
    ///
    /// # Arguments
    ///
    /// * `address` - `host:port`, `redis://host:port`, or several of them
    ///   separated by commas
    pub fn startup_node(mut self, address: impl Into<String>) -> Self {
        self.startup_nodes.push(address.into());
        self
    }

    /// Adds several seed nodes.
    pub fn startup_nodes<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.startup_nodes
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Password sent with `AUTH` on every node connection.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.options.password = Some(password.into());
        self
    }

    /// Sends `READONLY` on every node connection and reads from replicas.
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.options.readonly = readonly;
        self
    }

    /// Maximum time to wait for a TCP connection.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.options.connection_timeout = Some(timeout);
        self
    }

    /// Maximum time to wait for each reply.
    pub fn response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.response_timeout = timeout;
        self
    }

    /// Sets how many redirects a command follows.
    ///
    /// # Arguments
    ///
    /// * `max_redirects` - Redirects and retries before
    ///   [`Error::RedirectLimit`] (default 16)
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Connects to the seed nodes and loads the slot map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if no usable seed node was given
    /// and [`Error::Protocol`] if no seed node returned a slot map.
    pub async fn build(self) -> Result<ClusterClient> {
        let mut startup_nodes = Vec::new();
        for address in &self.startup_nodes {
            for part in address.split(',') {
                if let Some(node) = normalize_address(part)? {
                    startup_nodes.push(node);
                }
            }
        }
        if startup_nodes.is_empty() {
            return Err(Error::InvalidArgument {
                message: "no valid addresses provided".to_string(),
            });
        }

        let readonly = self.options.readonly;
        let client = ClusterClient {
            inner: Arc::new(Inner {
                startup_nodes,
                topology: RwLock::new(ClusterTopology::new()),
                pool: ConnectionPool::new(self.options),
                readonly,
                max_redirects: self.max_redirects,
                replica_cursor: AtomicUsize::new(0),
            }),
        };

        client.refresh_topology().await?;
        let nodes = client.node_count().await;
        info!(nodes, readonly, "connected to redis cluster");
        Ok(client)
    }
}

/// Turns `redis://host:port`, `host:port` or `host` into `host:port`.
fn normalize_address(address: &str) -> Result<Option<String>> {
    let address = address.trim();
    let address = address.strip_prefix("redis://").unwrap_or(address);
    let address = address.trim_end_matches('/');
    if address.is_empty() {
        return Ok(None);
    }

    match address.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() || port.parse::<u16>().is_err() {
                return Err(Error::InvalidArgument {
                    message: format!("invalid cluster node address {address:?}"),
                });
            }
            Ok(Some(address.to_string()))
        }
        None => Ok(Some(format!("{address}:6379"))),
    }
}

fn host_of(address: &str) -> &str {
    address.rsplit_once(':').map_or(address, |(host, _)| host)
}

impl ClusterClient {
    /// Connects using comma-separated seed nodes.
    pub async fn connect(addresses: &str) -> Result<Self> {
        Self::builder().startup_node(addresses).build().await
    }

    /// Starts configuring a cluster client.
    pub fn builder() -> ClusterClientBuilder {
        ClusterClientBuilder::default()
    }

    /// Reloads the slot map from the seed nodes, then from known masters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if no node answered `CLUSTER SLOTS`.
    #[instrument(skip(self), level = "debug")]
    pub async fn refresh_topology(&self) -> Result<()> {
        let mut candidates = self.inner.startup_nodes.clone();
        for address in self.inner.topology.read().await.master_addresses() {
            if !candidates.contains(&address) {
                candidates.push(address);
            }
        }

        let mut last_error = None;
        for address in &candidates {
            match self.fetch_topology_from_node(address).await {
                Ok(topology) => {
                    if !topology.is_fully_covered() {
                        warn!(%address, "cluster slot map does not cover every slot");
                    }
                    debug!(
                        %address,
                        ranges = topology.slot_ranges.len(),
                        "loaded cluster slot map"
                    );
                    *self.inner.topology.write().await = topology;
                    return Ok(());
                }
                Err(e) => {
                    warn!(%address, error = %e, "failed to load cluster slot map");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::protocol(match last_error {
            Some(e) => format!("failed to refresh topology from any seed node: {e}"),
            None => "failed to refresh topology from any seed node".to_string(),
        }))
    }

    async fn fetch_topology_from_node(&self, address: &str) -> Result<ClusterTopology> {
        let conn = self.inner.pool.get_or_connect(address).await?;
        match conn.send_command(cluster_slots().into_frame()).await {
            Ok(frame) => ClusterTopology::from_cluster_slots(frame, host_of(address)),
            Err(e) => {
                if e.is_connection_error() {
                    self.inner.pool.remove(address).await;
                }
                Err(e)
            }
        }
    }

    /// Picks the node for `slot`: a replica for reads in read-only mode,
    /// the master otherwise.
    async fn node_for_slot(&self, slot: u16, read: bool) -> Option<String> {
        let topology = self.inner.topology.read().await;
        let range = topology.range_for_slot(slot)?;
        if read && self.inner.readonly && !range.replicas.is_empty() {
            let index =
                self.inner.replica_cursor.fetch_add(1, Ordering::Relaxed) % range.replicas.len();
            return Some(range.replicas[index].address.clone());
        }
        Some(range.master.address.clone())
    }

    async fn refresh_quietly(&self) {
        if let Err(e) = self.refresh_topology().await {
            warn!(error = %e, "cluster topology refresh failed");
        }
    }

    async fn send_to(&self, address: &str, cmd: Cmd) -> Result<Frame> {
        let conn = self.inner.pool.get_or_connect(address).await?;
        conn.send_command(cmd.into_frame()).await
    }

    /// Pipelines `ASKING` with the command so no other caller's command
    /// lands between them on the shared connection.
    async fn send_asking(&self, address: &str, cmd: Cmd) -> Result<Frame> {
        let conn = self.inner.pool.get_or_connect(address).await?;
        let mut replies = conn
            .send_pipeline(vec![asking().into_frame(), cmd.into_frame()])
            .await?
            .into_iter();
        if let Some(Frame::Error(e)) = replies.next() {
            return Err(parse_redis_error(&e));
        }
        replies
            .next()
            .ok_or_else(|| Error::protocol("missing reply after ASKING"))
    }

    /// Sends a keyed command to the node owning its slot, following
    /// redirects.
    async fn route(&self, cmd: Cmd, read: bool) -> Result<Frame> {
        let key = cmd.key().ok_or_else(|| Error::InvalidArgument {
            message: format!("{} has no key to route by", cmd.name()),
        })?;
        let slot = key_slot(key);
        let attempts = self.inner.max_redirects + 1;
        let mut redirect = None;
        let mut last_error = None;

        for attempt in 0..attempts {
            let (address, ask) = match redirect.take() {
                Some(Redirect::Moved(address)) => (address, false),
                Some(Redirect::Ask(address)) => (address, true),
                None => match self.node_for_slot(slot, read).await {
                    Some(address) => (address, false),
                    None => {
                        debug!(slot, attempt, "no node serves slot");
                        last_error = Some(Error::ClusterDown);
                        self.refresh_quietly().await;
                        continue;
                    }
                },
            };

            let result = if ask {
                self.send_asking(&address, cmd.clone()).await
            } else {
                self.send_to(&address, cmd.clone()).await
            };

            let error = match result {
                Ok(Frame::Error(e)) => parse_redis_error(&e),
                Ok(frame) => return Ok(frame),
                Err(e) => e,
            };

            match error {
                Error::Moved { slot, address } => {
                    debug!(slot, %address, attempt, "MOVED redirect");
                    self.refresh_quietly().await;
                    redirect = Some(Redirect::Moved(address));
                }
                Error::Ask { slot, address } => {
                    debug!(slot, %address, attempt, "ASK redirect");
                    redirect = Some(Redirect::Ask(address));
                }
                Error::ClusterDown => {
                    warn!(slot, %address, attempt, "cluster is down, retrying");
                    tokio::time::sleep(CLUSTER_DOWN_BACKOFF).await;
                    self.refresh_quietly().await;
                    last_error = Some(Error::ClusterDown);
                }
                e if e.is_connection_error() => {
                    warn!(%address, error = %e, attempt, "cluster node connection failed");
                    self.inner.pool.remove(&address).await;
                    self.refresh_quietly().await;
                    last_error = Some(e);
                }
                e => return Err(e),
            }
        }

        Err(match last_error {
            Some(e) if e.is_connection_error() => e,
            _ => Error::RedirectLimit { attempts },
        })
    }

    /// Sends an arbitrary keyed command to the master owning its key.
    pub async fn query(&self, cmd: Cmd) -> Result<Frame> {
        self.route(cmd, false).await
    }

    /// Number of distinct nodes in the slot map.
    pub async fn node_count(&self) -> usize {
        self.inner.topology.read().await.nodes.len()
    }

    /// Number of slot ranges in the slot map.
    pub async fn slot_range_count(&self) -> usize {
        self.inner.topology.read().await.slot_ranges.len()
    }

    /// Whether every slot has an owner.
    pub async fn is_fully_covered(&self) -> bool {
        self.inner.topology.read().await.is_fully_covered()
    }

    /// Whether reads are served by replicas.
    pub fn is_readonly(&self) -> bool {
        self.inner.readonly
    }

    /// PINGs every master concurrently; fails with the first error.
    pub async fn ping(&self) -> Result<Bytes> {
        let masters = self.inner.topology.read().await.master_addresses();
        if masters.is_empty() {
            return Err(Error::ClusterDown);
        }

        let replies = join_all(
            masters
                .iter()
                .map(|address| self.send_to(address, command::ping())),
        )
        .await;
        for reply in replies {
            command::parse_frame_response(reply?)?;
        }
        Ok(Bytes::from_static(b"PONG"))
    }

    /// Echoes `msg` through the first master.
    pub async fn echo(&self, msg: &str) -> Result<Bytes> {
        let master = self
            .inner
            .topology
            .read()
            .await
            .master_addresses()
            .into_iter()
            .next()
            .ok_or(Error::ClusterDown)?;
        let frame = command::parse_frame_response(self.send_to(&master, command::echo(msg)).await?)?;
        Ok(command::frame_to_bytes(frame)?.unwrap_or_default())
    }

    /// Gets the value of `key`, `None` if it does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        command::frame_to_bytes(self.route(command::get(key), true).await?)
    }

    /// Sets the string value of a key.
    pub async fn set(&self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        self.route(command::set(key, value), false).await?;
        Ok(())
    }

    /// Sets the value of a key with an expiration time.
    pub async fn set_with_expiry(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        expiry: Duration,
    ) -> Result<()> {
        self.route(command::set_with_expiry(key, value, expiry), false)
            .await?;
        Ok(())
    }

    /// Sets `key` only if it does not exist yet.
    pub async fn setnx(&self, key: &str, value: impl Into<Bytes>) -> Result<bool> {
        command::frame_to_bool(self.route(command::setnx(key, value), false).await?)
    }

    /// Removes the specified key, returning whether it existed.
    pub async fn del(&self, key: &str) -> Result<bool> {
        Ok(command::frame_to_int(self.route(command::del(key), false).await?)? > 0)
    }

    /// Returns whether `key` exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(command::frame_to_int(self.route(command::exists(key), true).await?)? > 0)
    }

    /// Sets a timeout on `key`.
    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        command::frame_to_bool(self.route(command::expire(key, seconds), false).await?)
    }

    /// Remaining time to live of `key` in seconds.
    pub async fn ttl(&self, key: &str) -> Result<i64> {
        command::frame_to_int(self.route(command::ttl(key), true).await?)
    }

    /// Increments the number stored at key by one.
    pub async fn incr(&self, key: &str) -> Result<i64> {
        command::frame_to_int(self.route(command::incr(key), false).await?)
    }

    /// Increments the number stored at key by `amount`.
    pub async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        command::frame_to_int(self.route(command::incr_by(key, amount), false).await?)
    }

    /// Decrements the number stored at key by one.
    pub async fn decr(&self, key: &str) -> Result<i64> {
        command::frame_to_int(self.route(command::decr(key), false).await?)
    }

    /// Decrements the number stored at key by `amount`.
    pub async fn decr_by(&self, key: &str, amount: i64) -> Result<i64> {
        command::frame_to_int(self.route(command::decr_by(key, amount), false).await?)
    }

    /// Gets a hash field.
    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        command::frame_to_bytes(self.route(command::hget(key, field), true).await?)
    }

    /// Sets a hash field, returning true if the field is new.
    pub async fn hset(&self, key: &str, field: &str, value: impl Into<Bytes>) -> Result<bool> {
        command::frame_to_bool(self.route(command::hset(key, field, value), false).await?)
    }

    /// Deletes hash fields, returning how many were removed.
    pub async fn hdel(&self, key: &str, fields: &[&str]) -> Result<i64> {
        command::frame_to_int(self.route(command::hdel(key, fields), false).await?)
    }

    /// Gets every field of a hash.
    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        command::frame_to_hashmap(self.route(command::hgetall(key), true).await?)
    }
}
