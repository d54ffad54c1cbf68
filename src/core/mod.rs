//! Single-node ("normal" mode) client.
//!
//! - [`connection`] - Framed connection over an async stream
//! - [`multiplexed`] - Shared connection handle for concurrent requests
//! - [`command`] - Command builders and reply converters
//! - [`builder`] - Client builder

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub use crate::proto::error::{Error, Result};

/// Client builder configuration.
pub mod builder;
/// Command construction helpers.
pub mod command;
/// Low-level connection management.
pub mod connection;
/// Multiplexing logic.
pub mod multiplexed;

use command::Cmd;
use connection::Connection;
use multiplexed::MultiplexedConnection;

/// Default number of queued requests per connection.
pub(crate) const DEFAULT_QUEUE_SIZE: usize = 1024;

/// Settings applied while opening a connection, before it is multiplexed.
#[derive(Clone, Default)]
pub(crate) struct ConnectOptions {
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) database: Option<u8>,
    pub(crate) client_name: Option<String>,
    pub(crate) readonly: bool,
    pub(crate) connection_timeout: Option<Duration>,
    pub(crate) response_timeout: Option<Duration>,
    pub(crate) queue_size: usize,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("client_name", &self.client_name)
            .field("readonly", &self.readonly)
            .field("connection_timeout", &self.connection_timeout)
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

impl ConnectOptions {
    pub(crate) fn queue_size(&self) -> usize {
        if self.queue_size == 0 {
            DEFAULT_QUEUE_SIZE
        } else {
            self.queue_size
        }
    }
}

/// Opens a TCP connection to `host:port` and runs the handshake
/// (AUTH, SELECT, CLIENT SETNAME, READONLY) before multiplexing it.
pub(crate) async fn open(addr: &str, opts: &ConnectOptions) -> Result<MultiplexedConnection> {
    let connect = tokio::net::TcpStream::connect(addr);
    let stream = match opts.connection_timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| Error::Timeout)??,
        None => connect.await?,
    };
    stream.set_nodelay(true)?;

    let mut connection =
        Connection::new(stream).with_timeouts(opts.response_timeout, opts.response_timeout);

    if let Some(password) = &opts.password {
        let cmd = command::auth(opts.username.as_deref(), password);
        match connection.request(&cmd.into_frame()).await {
            Err(Error::Server { message }) => {
                debug!(%message, "AUTH rejected");
                return Err(Error::Auth);
            }
            other => {
                other?;
            }
        }
    }

    if let Some(db) = opts.database.filter(|db| *db != 0) {
        connection.request(&command::select(db).into_frame()).await?;
    }

    if let Some(name) = &opts.client_name {
        connection
            .request(&command::client_setname(name).into_frame())
            .await?;
    }

    if opts.readonly {
        connection.request(&command::readonly().into_frame()).await?;
    }

    debug!(addr, "connection established");
    // Past the handshake the per-request timeout applies instead; a read
    // timeout on the shared socket would tear it down for every caller.
    let connection = connection.with_timeouts(None, None);
    Ok(MultiplexedConnection::new(connection, opts.queue_size())
        .with_response_timeout(opts.response_timeout))
}

/// Parses `redis://host:port/db` into `(host:port, db)`.
pub(crate) fn parse_address(address: &str) -> Result<(String, Option<u8>)> {
    let parsed = url::Url::parse(address).map_err(|_| Error::InvalidArgument {
        message: "invalid address format".to_string(),
    })?;

    if parsed.scheme() != "redis" {
        return Err(Error::InvalidArgument {
            message: "invalid scheme, expected redis://".to_string(),
        });
    }

    let host = parsed.host_str().ok_or_else(|| Error::InvalidArgument {
        message: "missing host in address".to_string(),
    })?;
    let port = parsed.port().unwrap_or(6379);

    let database = match parsed.path().trim_start_matches('/') {
        "" => None,
        db => Some(db.parse::<u8>().map_err(|_| Error::InvalidArgument {
            message: format!("invalid database index {db:?}"),
        })?),
    };

    Ok((format!("{}:{}", host, port), database))
}

/// Redis client for a single server.
///
/// Cloning is cheap; all clones share one multiplexed connection. When the
/// server drops that connection the next command opens a new one with the
/// same handshake.
///
/// ```no_run
/// use alauda_redis_client::Client;
///
/// # async fn run() -> alauda_redis_client::Result<()> {
/// let client = Client::connect("redis://127.0.0.1:6379/0").await?;
/// assert_eq!(client.incr("visits").await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    connection: Arc<RwLock<MultiplexedConnection>>,
    options: Arc<ConnectOptions>,
    addr: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.addr)
            .field("database", &self.options.database)
            .finish()
    }
}

impl Client {
    pub(crate) async fn connect_inner(address: &str, mut opts: ConnectOptions) -> Result<Self> {
        let (addr, database) = parse_address(address)?;
        if opts.database.is_none() {
            opts.database = database;
        }
        let connection = open(&addr, &opts).await?;
        info!(%addr, database = opts.database.unwrap_or(0), "connected to redis");
        Ok(Self {
            connection: Arc::new(RwLock::new(connection)),
            options: Arc::new(opts),
            addr,
        })
    }

    /// Connects to `redis://host:port[/db]`.
    pub async fn connect<T: AsRef<str>>(addr: T) -> Result<Self> {
        Self::connect_inner(addr.as_ref(), ConnectOptions::default()).await
    }

    /// The `host:port` this client talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Returns the shared connection, reopening it if the server closed it.
    async fn connection(&self) -> Result<MultiplexedConnection> {
        {
            let conn = self.connection.read().await;
            if !conn.is_closed() {
                return Ok(conn.clone());
            }
        }

        let mut conn = self.connection.write().await;
        // Another caller may have reconnected while we waited.
        if conn.is_closed() {
            warn!(addr = %self.addr, "redis connection closed, reconnecting");
            *conn = open(&self.addr, &self.options).await?;
        }
        Ok(conn.clone())
    }

    /// Sends an arbitrary command and returns the raw reply.
    pub async fn query(&self, cmd: Cmd) -> Result<crate::proto::frame::Frame> {
        let connection = self.connection().await?;
        let frame = connection.send_command(cmd.into_frame()).await?;
        command::parse_frame_response(frame)
    }

    /// Sends a PING command to the server.
    pub async fn ping(&self) -> Result<Bytes> {
        let frame = self.query(command::ping()).await?;
        Ok(command::frame_to_bytes(frame)?.unwrap_or_else(|| Bytes::from_static(b"PONG")))
    }

    /// Echoes the provided message back from the server.
    pub async fn echo(&self, msg: &str) -> Result<Bytes> {
        let frame = self.query(command::echo(msg)).await?;
        Ok(command::frame_to_bytes(frame)?.unwrap_or_default())
    }

    /// Gets the value of `key`, `None` if it does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        command::frame_to_bytes(self.query(command::get(key)).await?)
    }

    /// Sets the string value of a key.
    pub async fn set(&self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        self.query(command::set(key, value)).await?;
        Ok(())
    }

    /// Sets the value of a key with an expiration time.
    pub async fn set_with_expiry(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        expiry: Duration,
    ) -> Result<()> {
        self.query(command::set_with_expiry(key, value, expiry))
            .await?;
        Ok(())
    }

    /// Sets `key` only if it does not exist yet.
    pub async fn setnx(&self, key: &str, value: impl Into<Bytes>) -> Result<bool> {
        command::frame_to_bool(self.query(command::setnx(key, value)).await?)
    }

    /// Removes the specified key, returning whether it existed.
    pub async fn del(&self, key: &str) -> Result<bool> {
        Ok(command::frame_to_int(self.query(command::del(key)).await?)? > 0)
    }

    /// Returns whether `key` exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(command::frame_to_int(self.query(command::exists(key)).await?)? > 0)
    }

    /// Sets a timeout on `key`.
    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        command::frame_to_bool(self.query(command::expire(key, seconds)).await?)
    }

    /// Remaining time to live of `key` in seconds (`-1` no expiry, `-2` missing).
    pub async fn ttl(&self, key: &str) -> Result<i64> {
        command::frame_to_int(self.query(command::ttl(key)).await?)
    }

    /// Increments the number stored at key by one.
    ///
    /// # Returns
    ///
    /// The value of the key after the increment.
    pub async fn incr(&self, key: &str) -> Result<i64> {
        command::frame_to_int(self.query(command::incr(key)).await?)
    }

    /// Increments the number stored at key by `amount`.
    pub async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        command::frame_to_int(self.query(command::incr_by(key, amount)).await?)
    }

    /// Decrements the number stored at key by one.
    pub async fn decr(&self, key: &str) -> Result<i64> {
        command::frame_to_int(self.query(command::decr(key)).await?)
    }

    /// Decrements the number stored at key by `amount`.
    pub async fn decr_by(&self, key: &str, amount: i64) -> Result<i64> {
        command::frame_to_int(self.query(command::decr_by(key, amount)).await?)
    }

    /// Gets a hash field.
    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        command::frame_to_bytes(self.query(command::hget(key, field)).await?)
    }

    /// Sets a hash field, returning true if the field is new.
    pub async fn hset(&self, key: &str, field: &str, value: impl Into<Bytes>) -> Result<bool> {
        command::frame_to_bool(self.query(command::hset(key, field, value)).await?)
    }

    /// Deletes hash fields, returning how many were removed.
    pub async fn hdel(&self, key: &str, fields: &[&str]) -> Result<i64> {
        command::frame_to_int(self.query(command::hdel(key, fields)).await?)
    }

    /// Gets every field of a hash.
    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        command::frame_to_hashmap(self.query(command::hgetall(key)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("redis://127.0.0.1:6380").unwrap(),
            ("127.0.0.1:6380".to_string(), None)
        );
        assert_eq!(
            parse_address("redis://localhost/3").unwrap(),
            ("localhost:6379".to_string(), Some(3))
        );
    }

    #[test]
    fn test_parse_address_rejects_bad_input() {
        assert!(matches!(
            parse_address("127.0.0.1:6379"),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            parse_address("http://localhost:6379"),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            parse_address("redis://localhost:6379/x"),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_connect_options_queue_size_default() {
        assert_eq!(ConnectOptions::default().queue_size(), DEFAULT_QUEUE_SIZE);
    }

    #[test]
    fn test_connect_options_debug_hides_password() {
        let opts = ConnectOptions {
            password: Some("hunter2".to_string()),
            ..ConnectOptions::default()
        };
        let debug = format!("{opts:?}");
        assert!(!debug.contains("hunter2"), "{debug}");
        assert!(debug.contains("***"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is reserved and nothing listens on it in test environments.
        let result = Client::connect("redis://127.0.0.1:1").await;
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
